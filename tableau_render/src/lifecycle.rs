// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Invalidation of renderer caches when the resources they use go away.
//!
//! Each renderer depends on the geometry and program it last drew with.
//! Destroying either marks it on the [`DESTROYED`] channel with eager
//! propagation; draining the channel yields every renderer whose cached
//! pipeline and uniform maps must be dropped.

use std::collections::HashMap;

use understory_dirty::{Channel, CycleHandling, DirtyTracker, EagerPolicy};

use tableau_core::renderer::RendererId;
use tableau_core::resource::GeometryId;

use crate::graphics::ProgramHandle;

/// A resource reached end of life.
pub const DESTROYED: Channel = Channel::new(0);

const KIND_SHIFT: u32 = 30;
const INDEX_MASK: u32 = (1 << KIND_SHIFT) - 1;
const RENDERER: u32 = 0;
const GEOMETRY: u32 = 1;
const PROGRAM: u32 = 2;

/// Something a renderer's caches depend on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Subject {
    /// A geometry.
    Geometry(GeometryId),
    /// A linked program.
    Program(ProgramHandle),
}

impl Subject {
    fn key(self) -> u32 {
        match self {
            Self::Geometry(g) => encode(GEOMETRY, g.index()),
            Self::Program(p) => encode(PROGRAM, p.0),
        }
    }
}

fn encode(kind: u32, index: u32) -> u32 {
    debug_assert!(index <= INDEX_MASK, "lifecycle key index out of range");
    (kind << KIND_SHIFT) | (index & INDEX_MASK)
}

/// Dependency graph from renderers to the resources they use.
#[derive(Debug)]
pub struct Lifecycle {
    dirty: DirtyTracker<u32>,
    renderers: HashMap<u32, RendererId>,
    observed: HashMap<RendererId, Vec<Subject>>,
    destroyed: Vec<u32>,
}

impl Lifecycle {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            renderers: HashMap::new(),
            observed: HashMap::new(),
            destroyed: Vec::new(),
        }
    }

    /// Records that `renderer` depends on `subject`.
    pub fn observe(&mut self, renderer: RendererId, subject: Subject) {
        let observed = self.observed.entry(renderer).or_default();
        if observed.contains(&subject) {
            return;
        }
        observed.push(subject);
        let key = encode(RENDERER, renderer.index());
        self.renderers.insert(key, renderer);
        let _ = self.dirty.add_dependency(key, subject.key(), DESTROYED);
    }

    /// Drops every dependency of `renderer`.
    pub fn forget(&mut self, renderer: RendererId) {
        let key = encode(RENDERER, renderer.index());
        if let Some(subjects) = self.observed.remove(&renderer) {
            for subject in subjects {
                self.dirty.remove_dependency(key, subject.key(), DESTROYED);
            }
        }
        if self.renderers.get(&key) == Some(&renderer) {
            self.renderers.remove(&key);
            self.dirty.remove_key(key);
        }
    }

    /// Marks `subject` destroyed.
    pub fn destroyed(&mut self, subject: Subject) {
        let key = subject.key();
        self.dirty.mark_with(key, DESTROYED, &EagerPolicy);
        self.destroyed.push(key);
    }

    /// Returns the renderers that depended on anything destroyed since the
    /// last drain, in deterministic order.
    pub fn drain(&mut self) -> Vec<RendererId> {
        let affected: Vec<u32> = self
            .dirty
            .drain(DESTROYED)
            .affected()
            .deterministic()
            .run()
            .collect();
        let invalidated: Vec<RendererId> = affected
            .into_iter()
            .filter(|key| key >> KIND_SHIFT == RENDERER)
            .filter_map(|key| self.renderers.get(&key).copied())
            .collect();

        let destroyed = core::mem::take(&mut self.destroyed);
        for renderer in &invalidated {
            if let Some(subjects) = self.observed.get_mut(renderer) {
                subjects.retain(|s| !destroyed.contains(&s.key()));
            }
        }
        for key in destroyed {
            self.dirty.remove_key(key);
        }
        invalidated
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
