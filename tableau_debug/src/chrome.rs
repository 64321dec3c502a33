// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! The update phase is drawn on thread 0 and the render phases on thread 1,
//! so the overlap of the two stages is visible.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use tableau_core::trace::PhaseKind;

use crate::recorder::{RecordedEvent, decode};

const UPDATE_THREAD: u32 = 0;
const RENDER_THREAD: u32 = 1;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
/// Counter events are stamped with the time of the last phase event seen.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    let mut last_ts = 0.0;

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::FrameBegin(e) => {
                last_ts = nanos_to_us(e.timestamp.nanos());
                events.push(json!({
                    "ph": "i",
                    "name": "FrameBegin",
                    "cat": "Update",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": UPDATE_THREAD,
                    "s": "g",
                    "args": {
                        "frame_index": e.frame_index,
                        "buffer": e.buffer.get(),
                    }
                }));
            }
            RecordedEvent::PhaseBegin(e) => {
                last_ts = nanos_to_us(e.timestamp.nanos());
                events.push(json!({
                    "ph": "B",
                    "name": e.phase.name(),
                    "cat": "Frame",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": thread(e.phase),
                    "args": {
                        "frame_index": e.frame_index,
                    }
                }));
            }
            RecordedEvent::PhaseEnd(e) => {
                last_ts = nanos_to_us(e.timestamp.nanos());
                events.push(json!({
                    "ph": "E",
                    "name": e.phase.name(),
                    "cat": "Frame",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": thread(e.phase),
                    "args": {
                        "frame_index": e.frame_index,
                    }
                }));
            }
            RecordedEvent::UpdateStats(e) => {
                events.push(json!({
                    "ph": "C",
                    "name": "Update",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": UPDATE_THREAD,
                    "args": {
                        "nodes_updated": e.nodes_updated,
                        "items": e.items,
                        "messages": e.messages,
                    }
                }));
            }
            RecordedEvent::RenderStats(e) => {
                events.push(json!({
                    "ph": "C",
                    "name": "Render",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": RENDER_THREAD,
                    "args": {
                        "draws": e.draws,
                        "skipped": e.skipped,
                        "uniform_bytes": e.uniform_bytes,
                    }
                }));
            }
            RecordedEvent::FrameSummary(s) => {
                events.push(json!({
                    "ph": "i",
                    "name": "FrameSummary",
                    "cat": "Summary",
                    "ts": nanos_to_us(s.begin.nanos()),
                    "pid": 0,
                    "tid": RENDER_THREAD,
                    "s": "g",
                    "args": {
                        "frame_index": s.frame_index,
                        "buffer": s.buffer.get(),
                        "update_us": nanos_to_us(s.update_nanos),
                        "pre_render_us": nanos_to_us(s.pre_render_nanos),
                        "render_scene_us": nanos_to_us(s.render_scene_nanos),
                        "post_render_us": nanos_to_us(s.post_render_nanos),
                        "draws": s.draws,
                        "scene_updated": s.scene_updated,
                    }
                }));
            }
            RecordedEvent::NodeChanges {
                frame_index,
                count,
                flags,
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "NodeChanges",
                    "cat": "Rich",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": UPDATE_THREAD,
                    "s": "t",
                    "args": {
                        "frame_index": frame_index,
                        "count": count,
                        "flags": format!("{flags:?}"),
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn thread(phase: PhaseKind) -> u32 {
    match phase {
        PhaseKind::Update => UPDATE_THREAD,
        PhaseKind::PreRender | PhaseKind::RenderScene | PhaseKind::PostRender => RENDER_THREAD,
    }
}

fn nanos_to_us(nanos: u64) -> f64 {
    nanos as f64 / 1000.0
}
