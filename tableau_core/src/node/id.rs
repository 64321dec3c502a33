// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node identity.

use crate::handle::{Handle, HandleKind};

/// Sentinel value meaning "no node" in the store's index fields.
pub const INVALID: u32 = u32::MAX;

/// Handle family for scene-graph nodes.
#[derive(Debug)]
pub enum NodeKind {}

impl HandleKind for NodeKind {
    const NAME: &'static str = "NodeId";
}

/// A handle to a node in a [`NodeStore`](super::NodeStore).
///
/// Contains a slot index and a generation counter so that stale handles are
/// detected after the node is discarded and the slot reused.
pub type NodeId = Handle<NodeKind>;
