// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resolution of custom uniforms to program locations.

use tableau_core::uniform::{UniformMap, UniformValue};

use crate::graphics::{ProgramReflection, UniformLocation};

/// Which map an indexed uniform is read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Renderer(usize),
    Node(usize),
}

/// Custom uniforms of one node and renderer, resolved against one program.
///
/// Node entries override renderer entries of the same name. The map is
/// rebuilt only when either source map gained or lost entries; value
/// changes are read through the stored indices.
#[derive(Clone, Debug, Default)]
pub struct UniformIndexMap {
    entries: Vec<(UniformLocation, Source)>,
    renderer_counter: Option<u64>,
    node_counter: Option<u64>,
}

impl UniformIndexMap {
    /// Creates an unbuilt map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the map if either source changed layout.
    ///
    /// Returns whether a rebuild happened.
    pub fn update(
        &mut self,
        reflection: &ProgramReflection,
        renderer: &UniformMap,
        node: &UniformMap,
    ) -> bool {
        if self.renderer_counter == Some(renderer.change_counter())
            && self.node_counter == Some(node.change_counter())
        {
            return false;
        }
        self.entries.clear();
        for (i, entry) in renderer.iter().enumerate() {
            if node.get(&entry.name).is_some() {
                continue;
            }
            if let Some(location) = reflection.find(&entry.name) {
                self.entries.push((location, Source::Renderer(i)));
            }
        }
        for (i, entry) in node.iter().enumerate() {
            if let Some(location) = reflection.find(&entry.name) {
                self.entries.push((location, Source::Node(i)));
            }
        }
        self.renderer_counter = Some(renderer.change_counter());
        self.node_counter = Some(node.change_counter());
        true
    }

    /// Current values with their locations.
    pub fn resolve<'a>(
        &'a self,
        renderer: &'a UniformMap,
        node: &'a UniformMap,
    ) -> impl Iterator<Item = (UniformLocation, UniformValue)> + 'a {
        self.entries.iter().filter_map(|&(location, source)| {
            let entry = match source {
                Source::Renderer(i) => renderer.entry(i),
                Source::Node(i) => node.entry(i),
            }?;
            Some((location, entry.value))
        })
    }

    /// Number of resolved uniforms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no uniform resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
