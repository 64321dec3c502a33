// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scene-graph nodes.
//!
//! A *node* is one vertex of the update-side scene graph. Each node has:
//!
//! - An identity ([`NodeId`]), a generational handle allocated on the event
//!   side and released once the node has left the discard queue.
//! - Topology: parent, first-child, and sibling links forming an ordered
//!   tree. Only the subtree below the installed root is *connected* and
//!   visited by the update.
//! - **Local properties** in double-buffered [`AnimatableProperty`] cells,
//!   written through [`NodeStore::bake_property`] and
//!   [`NodeStore::set_property`].
//! - **World properties** in [`InheritedProperty`] cells, produced by
//!   [`NodeStore::update_nodes`] from the parent's world values and the
//!   node's inheritance policies.
//!
//! # Dirty flags
//!
//! Mutations of policies set [`NodeDirtyFlags`] on the node; animatable
//! properties that have not settled imply their flags. The
//! [`INHERITED`](NodeDirtyFlags::INHERITED) subset propagates to every
//! descendant during the update. Flags are cleared once consumed, so they
//! persist for exactly one frame.
//!
//! [`AnimatableProperty`]: crate::property::AnimatableProperty
//! [`InheritedProperty`]: crate::property::InheritedProperty

mod flags;
mod id;
mod store;
mod traverse;
mod update;

pub use flags::{ColorMode, DrawMode, NodeDirtyFlags, PositionInheritanceMode};
pub use id::{INVALID, NodeId, NodeKind};
pub use store::{NodeProperty, NodeStore};
pub use traverse::Children;
pub use update::NodeUpdate;
