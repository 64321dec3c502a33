// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ordered collection of render tasks.

use crate::node::{NodeId, NodeStore};
use crate::property::{BufferIndex, PropertyOwner};

use super::{RenderTask, RenderTaskId, RenderTaskMessage};

/// Every render task, in draw order.
///
/// The first task added is the default task.
#[derive(Debug, Default)]
pub struct RenderTaskList {
    pub(super) tasks: Vec<RenderTask>,
}

impl RenderTaskList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new task.
    ///
    /// # Panics
    ///
    /// Panics if a task with the same handle is already present.
    pub fn add(&mut self, id: RenderTaskId) {
        assert!(self.index_of(id).is_none(), "{id:?} added twice");
        self.tasks.push(RenderTask::new(id));
    }

    /// Removes a task, releasing its exclusive claim. Returns whether the
    /// task was present.
    ///
    /// A released claim passes to the last remaining task that is still
    /// exclusive on the same source.
    pub fn remove(&mut self, id: RenderTaskId, nodes: &mut NodeStore) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let task = self.tasks.remove(index);
        task.release_claim(nodes);
        self.reclaim(task.source_node(), nodes);
        true
    }

    /// Applies a message to a task.
    ///
    /// Messages for unknown tasks are dropped with a warning.
    pub fn apply(
        &mut self,
        id: RenderTaskId,
        message: RenderTaskMessage,
        nodes: &mut NodeStore,
        buffer: BufferIndex,
    ) {
        match self.get_mut(id) {
            Some(task) => {
                let source = task.source_node();
                task.apply(message, nodes, buffer);
                self.reclaim(source, nodes);
            }
            None => log::warn!("message {message:?} for unknown {id:?} dropped"),
        }
    }

    /// Gives an unclaimed `source` to the last task still exclusive on it.
    fn reclaim(&self, source: Option<NodeId>, nodes: &mut NodeStore) {
        let Some(source) = source.filter(|s| nodes.is_alive(*s)) else {
            return;
        };
        if nodes.exclusive_task(source).is_some() {
            return;
        }
        if let Some(heir) = self
            .tasks
            .iter()
            .rev()
            .find(|t| t.is_exclusive() && t.source_node() == Some(source))
        {
            nodes.set_exclusive_task(source, Some(heir.id()));
        }
    }

    /// Drops every reference to a destroyed node.
    pub fn forget_node(&mut self, node: NodeId) {
        for task in &mut self.tasks {
            task.forget_node(node);
        }
    }

    /// Returns a task by handle.
    #[must_use]
    pub fn get(&self, id: RenderTaskId) -> Option<&RenderTask> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    /// Returns a task by handle.
    pub fn get_mut(&mut self, id: RenderTaskId) -> Option<&mut RenderTask> {
        self.tasks.iter_mut().find(|t| t.id() == id)
    }

    /// The default task, if any task exists.
    #[must_use]
    pub fn default_task(&self) -> Option<&RenderTask> {
        self.tasks.first()
    }

    /// Tasks in draw order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &RenderTask> {
        self.tasks.iter()
    }

    /// Tasks in draw order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RenderTask> {
        self.tasks.iter_mut()
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn index_of(&self, id: RenderTaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id() == id)
    }
}

impl PropertyOwner for RenderTaskList {
    fn reset_default_properties(&mut self, buffer: BufferIndex) {
        for task in &mut self.tasks {
            task.reset_default_properties(buffer);
        }
    }
}
