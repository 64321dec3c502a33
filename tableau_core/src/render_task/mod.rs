// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render tasks.
//!
//! A [`RenderTask`] binds a source subtree, a camera node, and an optional
//! framebuffer into one rendering pass. The [`RenderTaskList`] owns every
//! task; its first task is the default task that draws the whole scene to
//! the surface.
//!
//! Each frame the list is [processed](RenderTaskList::process) into
//! [`RenderInstruction`](crate::instruction::RenderInstruction)s: off-screen
//! tasks first, then on-screen tasks. Tasks that are not ready or whose
//! source is claimed exclusively by another task are skipped. Afterwards
//! every task advances its refresh state machine; a render-once task
//! reports completion through [`RenderTask::has_rendered`].
//!
//! The same list answers hit tests, walking tasks in reverse draw order.

mod list;
mod processor;
mod task;

pub use hit_test::HitResult;
pub use list::RenderTaskList;
pub use processor::{FrameBufferPolicy, TaskProcessing};
pub use task::{CoordinateMapping, RenderTask, RenderTaskMessage, RenderTaskState};

use crate::handle::{Handle, HandleKind};

/// Render the task once, then stop.
pub const REFRESH_ONCE: u32 = 0;
/// Render the task every frame.
pub const REFRESH_ALWAYS: u32 = 1;

/// Handle family for render tasks.
#[derive(Debug)]
pub enum RenderTaskKind {}

impl HandleKind for RenderTaskKind {
    const NAME: &'static str = "RenderTaskId";
}

/// A handle to a render task.
pub type RenderTaskId = Handle<RenderTaskKind>;
