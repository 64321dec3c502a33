// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Double-buffered scene graph and update stage.
//!
//! `tableau_core` holds everything the update stage owns: nodes with
//! double-buffered properties, the per-frame traversal that derives their
//! world values, render tasks, and the instructions handed to the render
//! stage. Storage is struct-of-arrays with generational handles.
//!
//! # Architecture
//!
//! ```text
//!   EventToUpdate ──► Message queue
//!                         │
//!                         ▼
//!   UpdateManager::update(buffer B)
//!       reset ─► apply messages ─► update_nodes ─► update_cameras
//!                                                       │
//!                         ┌─────────────────────────────┘
//!                         ▼
//!   RenderTaskList::process ──► RenderMessage::Instructions ──► render stage
//!                         │
//!                         ▼
//!   Notification queue ──► application
//! ```
//!
//! While the update computes buffer `B`, the render stage may draw `1 - B`.
//!
//! **[`property`]** — [`AnimatableProperty`](property::AnimatableProperty)
//! and [`InheritedProperty`](property::InheritedProperty) cells holding one
//! value per buffer, and the [`PropertyOwner`](property::PropertyOwner)
//! reset hook.
//!
//! **[`node`]** — The [`NodeStore`](node::NodeStore): topology, local and
//! world properties, inheritance policies, dirty flags, and the update
//! traversal.
//!
//! **[`render_task`]** — Render tasks, their refresh state machine,
//! instruction generation, and hit testing.
//!
//! **[`instruction`]** — Render items, lists, instructions, and the
//! [`RenderMessage`](instruction::RenderMessage)s sent to the render stage.
//!
//! **[`message`]** — [`EventToUpdate`](message::EventToUpdate),
//! [`Message`](message::Message), and
//! [`Notification`](message::Notification).
//!
//! **[`update`]** — The [`UpdateManager`](update::UpdateManager) and
//! [`pipeline`](update::pipeline).
//!
//! **[`camera`]**, **[`renderer`]**, **[`resource`]**, **[`uniform`]** —
//! Descriptions shared by both stages.
//!
//! **[`trace`]** — [`TraceSink`](trace::TraceSink) trait and event types for
//! frame instrumentation, with a zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one
//!   branch per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-node
//!   change events.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod camera;
pub mod discard;
pub mod handle;
pub mod instruction;
pub mod math;
pub mod message;
pub mod node;
pub mod property;
pub mod render_task;
pub mod renderer;
pub mod resource;
pub mod time;
pub mod trace;
pub mod uniform;
pub mod update;
