// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].
//!
//! [`on_node_changes`](TraceSink::on_node_changes) stores only the count and
//! the union of the dirty flags.

use tableau_core::node::NodeDirtyFlags;
use tableau_core::property::BufferIndex;
use tableau_core::time::HostTime;
use tableau_core::trace::{
    FrameBeginEvent, FrameSummary, NodeChange, PhaseBeginEvent, PhaseEndEvent, PhaseKind,
    RenderStatsEvent, TraceSink, UpdateStatsEvent,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_FRAME_BEGIN: u8 = 1;
const TAG_PHASE_BEGIN: u8 = 2;
const TAG_PHASE_END: u8 = 3;
const TAG_UPDATE_STATS: u8 = 4;
const TAG_RENDER_STATS: u8 = 5;
const TAG_FRAME_SUMMARY: u8 = 6;
const TAG_NODE_CHANGES: u8 = 7;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_buffer(&mut self, b: BufferIndex) {
        self.write_bool(b == BufferIndex::ONE);
    }

    fn write_phase(&mut self, p: PhaseKind) {
        self.write_u8(match p {
            PhaseKind::Update => 0,
            PhaseKind::PreRender => 1,
            PhaseKind::RenderScene => 2,
            PhaseKind::PostRender => 3,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        self.write_u8(TAG_FRAME_BEGIN);
        self.write_u64(e.frame_index);
        self.write_buffer(e.buffer);
        self.write_u64(e.timestamp.nanos());
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_u8(TAG_PHASE_BEGIN);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.nanos());
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_u8(TAG_PHASE_END);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.nanos());
    }

    fn on_update_stats(&mut self, e: &UpdateStatsEvent) {
        self.write_u8(TAG_UPDATE_STATS);
        self.write_u64(e.frame_index);
        self.write_u32(e.messages);
        self.write_u32(e.nodes_updated);
        self.write_u32(e.cameras);
        self.write_u32(e.instructions);
        self.write_u32(e.items);
        self.write_bool(e.scene_updated);
    }

    fn on_render_stats(&mut self, e: &RenderStatsEvent) {
        self.write_u8(TAG_RENDER_STATS);
        self.write_u64(e.frame_index);
        self.write_u32(e.instructions);
        self.write_u32(e.draws);
        self.write_u32(e.skipped);
        self.write_u32(e.pipelines_created);
        self.write_u32(e.programs_created);
        self.write_u64(e.uniform_bytes);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.write_u8(TAG_FRAME_SUMMARY);
        self.write_u64(s.frame_index);
        self.write_buffer(s.buffer);
        self.write_u64(s.begin.nanos());
        self.write_u64(s.update_nanos);
        self.write_u64(s.pre_render_nanos);
        self.write_u64(s.render_scene_nanos);
        self.write_u64(s.post_render_nanos);
        self.write_u32(s.draws);
        self.write_bool(s.scene_updated);
    }

    fn on_node_changes(&mut self, frame_index: u64, changes: &[NodeChange]) {
        self.write_u8(TAG_NODE_CHANGES);
        self.write_u64(frame_index);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "node change count capped at u32::MAX for recording"
        )]
        self.write_u32(changes.len().min(u32::MAX as usize) as u32);
        let union = changes
            .iter()
            .fold(NodeDirtyFlags::empty(), |acc, c| acc | c.flags);
        self.write_u32(union.bits());
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`FrameBeginEvent`].
    FrameBegin(FrameBeginEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// An [`UpdateStatsEvent`].
    UpdateStats(UpdateStatsEvent),
    /// A [`RenderStatsEvent`].
    RenderStats(RenderStatsEvent),
    /// A [`FrameSummary`].
    FrameSummary(FrameSummary),
    /// Node changes of a frame.
    NodeChanges {
        /// Frame counter.
        frame_index: u64,
        /// Number of changed nodes.
        count: u32,
        /// Union of their dirty flags.
        flags: NodeDirtyFlags,
    },
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_bool(&mut self) -> Option<bool> {
        Some(self.read_u8()? != 0)
    }

    fn read_buffer(&mut self) -> Option<BufferIndex> {
        Some(if self.read_bool()? {
            BufferIndex::ONE
        } else {
            BufferIndex::ZERO
        })
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_phase(&mut self) -> Option<PhaseKind> {
        Some(match self.read_u8()? {
            0 => PhaseKind::Update,
            1 => PhaseKind::PreRender,
            2 => PhaseKind::RenderScene,
            _ => PhaseKind::PostRender,
        })
    }

    fn decode_frame_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameBegin(FrameBeginEvent {
            frame_index: self.read_u64()?,
            buffer: self.read_buffer()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_phase_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_phase_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_update_stats(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::UpdateStats(UpdateStatsEvent {
            frame_index: self.read_u64()?,
            messages: self.read_u32()?,
            nodes_updated: self.read_u32()?,
            cameras: self.read_u32()?,
            instructions: self.read_u32()?,
            items: self.read_u32()?,
            scene_updated: self.read_bool()?,
        }))
    }

    fn decode_render_stats(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::RenderStats(RenderStatsEvent {
            frame_index: self.read_u64()?,
            instructions: self.read_u32()?,
            draws: self.read_u32()?,
            skipped: self.read_u32()?,
            pipelines_created: self.read_u32()?,
            programs_created: self.read_u32()?,
            uniform_bytes: self.read_u64()?,
        }))
    }

    fn decode_frame_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameSummary(FrameSummary {
            frame_index: self.read_u64()?,
            buffer: self.read_buffer()?,
            begin: self.read_time()?,
            update_nanos: self.read_u64()?,
            pre_render_nanos: self.read_u64()?,
            render_scene_nanos: self.read_u64()?,
            post_render_nanos: self.read_u64()?,
            draws: self.read_u32()?,
            scene_updated: self.read_bool()?,
        }))
    }

    fn decode_node_changes(&mut self) -> Option<RecordedEvent> {
        let frame_index = self.read_u64()?;
        let count = self.read_u32()?;
        let flags = NodeDirtyFlags::from_bits_truncate(self.read_u32()?);
        Some(RecordedEvent::NodeChanges {
            frame_index,
            count,
            flags,
        })
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_u8()? {
            TAG_FRAME_BEGIN => self.decode_frame_begin(),
            TAG_PHASE_BEGIN => self.decode_phase_begin(),
            TAG_PHASE_END => self.decode_phase_end(),
            TAG_UPDATE_STATS => self.decode_update_stats(),
            TAG_RENDER_STATS => self.decode_render_stats(),
            TAG_FRAME_SUMMARY => self.decode_frame_summary(),
            TAG_NODE_CHANGES => self.decode_node_changes(),
            // unknown tag
            _ => None,
        }
    }
}
