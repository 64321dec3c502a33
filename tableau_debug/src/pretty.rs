// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! and durations are printed in microseconds.

use std::io::Write;

use tableau_core::time::HostTime;
use tableau_core::trace::{
    FrameBeginEvent, FrameSummary, NodeChange, PhaseBeginEvent, PhaseEndEvent, RenderStatsEvent,
    TraceSink, UpdateStatsEvent,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns its writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

fn us(nanos: u64) -> f64 {
    nanos as f64 / 1000.0
}

fn at(t: HostTime) -> f64 {
    us(t.nanos())
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[frame] frame={} buffer={} at {:.1}µs",
            e.frame_index,
            e.buffer.get(),
            at(e.timestamp),
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:begin] frame={} {} at {:.1}µs",
            e.frame_index,
            e.phase.name(),
            at(e.timestamp),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:end] frame={} {} at {:.1}µs",
            e.frame_index,
            e.phase.name(),
            at(e.timestamp),
        );
    }

    fn on_update_stats(&mut self, e: &UpdateStatsEvent) {
        let _ = writeln!(
            self.writer,
            "[update] frame={} messages={} nodes={} cameras={} instructions={} items={}{}",
            e.frame_index,
            e.messages,
            e.nodes_updated,
            e.cameras,
            e.instructions,
            e.items,
            if e.scene_updated { "" } else { " (idle)" },
        );
    }

    fn on_render_stats(&mut self, e: &RenderStatsEvent) {
        let _ = writeln!(
            self.writer,
            "[render] frame={} instructions={} draws={} skipped={} \
             new_pipelines={} new_programs={} uniforms={}B",
            e.frame_index,
            e.instructions,
            e.draws,
            e.skipped,
            e.pipelines_created,
            e.programs_created,
            e.uniform_bytes,
        );
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        let _ = writeln!(
            self.writer,
            "[summary] frame={} buffer={} update={:.1}µs pre={:.1}µs \
             scene={:.1}µs post={:.1}µs draws={}",
            s.frame_index,
            s.buffer.get(),
            us(s.update_nanos),
            us(s.pre_render_nanos),
            us(s.render_scene_nanos),
            us(s.post_render_nanos),
            s.draws,
        );
    }

    fn on_node_changes(&mut self, frame_index: u64, changes: &[NodeChange]) {
        let _ = writeln!(
            self.writer,
            "[nodes] frame={frame_index} changes={}",
            changes.len(),
        );
    }
}

#[cfg(test)]
mod tests {
    use tableau_core::property::BufferIndex;
    use tableau_core::trace::PhaseKind;

    use super::*;

    fn output(sink: PrettyPrintSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_writer()).unwrap()
    }

    #[test]
    fn phases_print_their_names_in_microseconds() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_phase_begin(&PhaseBeginEvent {
            frame_index: 2,
            phase: PhaseKind::RenderScene,
            timestamp: HostTime(1_500),
        });
        let output = output(sink);
        assert_eq!(output, "[phase:begin] frame=2 render_scene at 1.5µs\n");
    }

    #[test]
    fn idle_updates_are_marked() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_update_stats(&UpdateStatsEvent {
            frame_index: 4,
            ..UpdateStatsEvent::default()
        });
        sink.on_frame_begin(&FrameBeginEvent {
            frame_index: 5,
            buffer: BufferIndex::ONE,
            timestamp: HostTime(0),
        });
        let output = output(sink);
        let lines: Vec<_> = output.lines().collect();
        assert!(lines[0].starts_with("[update] frame=4"), "got: {output}");
        assert!(lines[0].ends_with("(idle)"), "got: {output}");
        assert!(lines[1].contains("buffer=1"), "got: {output}");
    }
}
