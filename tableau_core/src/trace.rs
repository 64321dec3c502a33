// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the update and render stages.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! [`UpdateManager`](crate::update::UpdateManager) and the render manager
//! call at each stage of a frame. All method bodies default to no-ops, so
//! implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing (zero overhead). When
//! **on**, each method performs a single `Option` branch before dispatching.
//!
//! [`FrameSummaryBuilder`] collects phase timestamps during a frame and
//! produces a [`FrameSummary`] at the end.
//!
//! # Crate features
//!
//! - `trace` enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`) gates [`NodeChange`] events and the
//!   corresponding `TraceSink` method.

#[cfg(feature = "trace-rich")]
use crate::node::NodeDirtyFlags;
use crate::property::BufferIndex;
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which phase of a frame is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Message processing, node traversal, and instruction generation.
    Update,
    /// Render message processing.
    PreRender,
    /// Drawing the instructions of the render buffer.
    RenderScene,
    /// Tracker updates, submission, and the buffer swap.
    PostRender,
}

impl PhaseKind {
    /// Every phase, in frame order.
    pub const ALL: [Self; 4] = [
        Self::Update,
        Self::PreRender,
        Self::RenderScene,
        Self::PostRender,
    ];

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::PreRender => "pre_render",
            Self::RenderScene => "render_scene",
            Self::PostRender => "post_render",
        }
    }

    /// Maps the phase to an array index.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Update => 0,
            Self::PreRender => 1,
            Self::RenderScene => 2,
            Self::PostRender => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when the update stage starts computing a buffer.
#[derive(Clone, Copy, Debug)]
pub struct FrameBeginEvent {
    /// Monotonic frame counter.
    pub frame_index: u64,
    /// Buffer being computed.
    pub buffer: BufferIndex,
    /// Host time at the start of the frame.
    pub timestamp: HostTime,
}

/// Marks the beginning of a frame phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBeginEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Host time at the start of the phase.
    pub timestamp: HostTime,
}

/// Marks the end of a frame phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseEndEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Host time at the end of the phase.
    pub timestamp: HostTime,
}

/// Counters of one update.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateStatsEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Messages applied.
    pub messages: u32,
    /// Nodes with at least one effective dirty flag.
    pub nodes_updated: u32,
    /// Cameras recomputed.
    pub cameras: u32,
    /// Instructions produced; zero when the scene was not updated.
    pub instructions: u32,
    /// Render items over all instructions.
    pub items: u32,
    /// Whether the scene was traversed.
    pub scene_updated: bool,
}

/// Counters of one render.
#[derive(Clone, Copy, Debug, Default)]
pub struct RenderStatsEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Instructions drawn.
    pub instructions: u32,
    /// Draw calls recorded.
    pub draws: u32,
    /// Items skipped for unready resources.
    pub skipped: u32,
    /// Pipelines created this frame.
    pub pipelines_created: u32,
    /// Programs created this frame.
    pub programs_created: u32,
    /// Uniform bytes written this frame.
    pub uniform_bytes: u64,
}

/// Per-frame timing summary produced by [`FrameSummaryBuilder`].
#[derive(Clone, Copy, Debug)]
pub struct FrameSummary {
    /// Frame counter.
    pub frame_index: u64,
    /// Buffer the frame drew.
    pub buffer: BufferIndex,
    /// Host time when the frame began.
    pub begin: HostTime,
    /// Update phase duration in nanoseconds (0 if not measured).
    pub update_nanos: u64,
    /// Pre-render phase duration in nanoseconds (0 if not measured).
    pub pre_render_nanos: u64,
    /// Render-scene phase duration in nanoseconds (0 if not measured).
    pub render_scene_nanos: u64,
    /// Post-render phase duration in nanoseconds (0 if not measured).
    pub post_render_nanos: u64,
    /// Draw calls recorded.
    pub draws: u32,
    /// Whether the update traversed the scene.
    pub scene_updated: bool,
}

/// A per-frame node change record.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug)]
pub struct NodeChange {
    /// Slot index of the node that changed.
    pub node_index: u32,
    /// Effective dirty flags of the node.
    pub flags: NodeDirtyFlags,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the update and render stages.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when the update stage starts a frame.
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        _ = e;
    }

    /// Called at the beginning of a frame phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a frame phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called once per update with its counters.
    fn on_update_stats(&mut self, e: &UpdateStatsEvent) {
        _ = e;
    }

    /// Called once per render with its counters.
    fn on_render_stats(&mut self, e: &RenderStatsEvent) {
        _ = e;
    }

    /// Called with a per-frame timing summary.
    fn on_frame_summary(&mut self, s: &FrameSummary) {
        _ = s;
    }

    /// Called with per-frame node changes (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_node_changes(&mut self, frame_index: u64, changes: &[NodeChange]) {
        _ = (frame_index, changes);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`FrameBeginEvent`].
    #[inline]
    pub fn frame_begin(&mut self, e: &FrameBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_frame_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PhaseBeginEvent`].
    #[inline]
    pub fn phase_begin(&mut self, e: &PhaseBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_phase_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PhaseEndEvent`].
    #[inline]
    pub fn phase_end(&mut self, e: &PhaseEndEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_phase_end(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`UpdateStatsEvent`].
    #[inline]
    pub fn update_stats(&mut self, e: &UpdateStatsEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_update_stats(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`RenderStatsEvent`].
    #[inline]
    pub fn render_stats(&mut self, e: &RenderStatsEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_render_stats(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FrameSummary`].
    #[inline]
    pub fn frame_summary(&mut self, s: &FrameSummary) {
        #[cfg(feature = "trace")]
        if let Some(sink) = &mut self.sink {
            sink.on_frame_summary(s);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = s;
        }
    }

    /// Emits node changes (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn node_changes(&mut self, frame_index: u64, changes: &[NodeChange]) {
        if let Some(s) = &mut self.sink {
            s.on_node_changes(frame_index, changes);
        }
    }

    /// Returns whether events reach a sink.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        #[cfg(feature = "trace")]
        {
            self.sink.is_some()
        }
        #[cfg(not(feature = "trace"))]
        {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// FrameSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps during a frame and produces a [`FrameSummary`].
#[derive(Debug)]
pub struct FrameSummaryBuilder {
    frame_index: u64,
    buffer: BufferIndex,
    begin: HostTime,
    phase_starts: [Option<HostTime>; 4],
    phase_ends: [Option<HostTime>; 4],
    draws: u32,
    scene_updated: bool,
}

impl FrameSummaryBuilder {
    /// Starts building a summary for a frame.
    #[must_use]
    pub fn new(frame_index: u64, buffer: BufferIndex, begin: HostTime) -> Self {
        Self {
            frame_index,
            buffer,
            begin,
            phase_starts: [None; 4],
            phase_ends: [None; 4],
            draws: 0,
            scene_updated: false,
        }
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_starts[phase.index()] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_ends[phase.index()] = Some(t);
    }

    /// Sets the number of draw calls.
    pub fn set_draws(&mut self, draws: u32) {
        self.draws = draws;
    }

    /// Sets whether the update traversed the scene.
    pub fn set_scene_updated(&mut self, updated: bool) {
        self.scene_updated = updated;
    }

    /// Consumes the builder and produces the final [`FrameSummary`].
    #[must_use]
    pub fn finish(self) -> FrameSummary {
        FrameSummary {
            frame_index: self.frame_index,
            buffer: self.buffer,
            begin: self.begin,
            update_nanos: self.phase_duration(PhaseKind::Update),
            pre_render_nanos: self.phase_duration(PhaseKind::PreRender),
            render_scene_nanos: self.phase_duration(PhaseKind::RenderScene),
            post_render_nanos: self.phase_duration(PhaseKind::PostRender),
            draws: self.draws,
            scene_updated: self.scene_updated,
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> u64 {
        let idx = phase.index();
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).nanos(),
            _ => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
