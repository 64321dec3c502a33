// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render stage for `tableau`.
//!
//! The [`RenderManager`](manager::RenderManager) consumes the
//! [`RenderMessage`](tableau_core::instruction::RenderMessage)s produced by
//! the update stage and turns each frame's render instructions into a
//! [`CommandBuffer`](graphics::CommandBuffer) submitted to a
//! [`Controller`](graphics::Controller).
//!
//! ```text
//!   RenderMessage queue ──► PreRender: resources, renderers, instructions
//!                               │
//!                               ▼
//!                           RenderScene: one render pass per instruction,
//!                               │        Renderer::draw per item and queue
//!                               ▼
//!                           PostRender: flush uniforms, submit, sync trackers
//! ```
//!
//! **[`graphics`]**: the [`Controller`](graphics::Controller) trait a GPU
//! backend implements, backend handles, and recorded commands.
//!
//! **[`renderer`]**: per-renderer draw logic. Culling, program and
//! pipeline lookup, uniform writes, and draw command recording.
//!
//! **[`program`]**, **[`pipeline_cache`]**: content-addressed caches of
//! linked programs and pipelines.
//!
//! **[`uniform_buffer`]**, **[`uniform_map`]**: paged uniform memory and
//! the name-to-location maps resolved against program reflection.
//!
//! **[`resources`]**: the render-side resource table.
//!
//! **[`lifecycle`]**: invalidation of renderer caches when their geometry
//! or program is destroyed.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Forwards to `tableau_core/trace`, so the
//!   render phases reach the installed trace sink.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod graphics;
pub mod lifecycle;
pub mod manager;
pub mod pipeline_cache;
pub mod program;
pub mod renderer;
pub mod resources;
pub mod uniform_buffer;
pub mod uniform_map;

#[cfg(test)]
mod testing;
