// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Custom uniform values attached to nodes and renderers.

use std::sync::Arc;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

/// Hashes a uniform name with 64-bit FNV-1a.
#[must_use]
pub const fn uniform_name_hash(name: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let bytes = name.as_bytes();
    let mut hash = OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(PRIME);
        i += 1;
    }
    hash
}

/// A value that can be written into a uniform block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    /// Scalar float.
    Float(f32),
    /// Scalar integer.
    Int(i32),
    /// Two-component vector.
    Vec2(Vec2),
    /// Three-component vector.
    Vec3(Vec3),
    /// Four-component vector.
    Vec4(Vec4),
    /// 3x3 matrix.
    Mat3(Mat3),
    /// 4x4 matrix.
    Mat4(Mat4),
}

/// One named entry of a [`UniformMap`].
#[derive(Clone, Debug, PartialEq)]
pub struct UniformEntry {
    /// Hash of [`name`](Self::name).
    pub hash: u64,
    /// Uniform name as declared in the shader.
    pub name: Arc<str>,
    /// Current value.
    pub value: UniformValue,
}

/// An ordered set of named uniform values.
///
/// The change counter moves only when an entry is added or removed. Value
/// updates keep the counter, so index maps built against the map's layout
/// stay valid.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UniformMap {
    entries: Vec<UniformEntry>,
    change_counter: u64,
}

impl UniformMap {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            change_counter: 0,
        }
    }

    /// Inserts or updates `name`.
    pub fn insert(&mut self, name: &str, value: UniformValue) {
        let hash = uniform_name_hash(name);
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.hash == hash && &*e.name == name)
        {
            entry.value = value;
            return;
        }
        self.entries.push(UniformEntry {
            hash,
            name: Arc::from(name),
            value,
        });
        self.change_counter += 1;
    }

    /// Removes `name`, returning whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let hash = uniform_name_hash(name);
        let before = self.entries.len();
        self.entries.retain(|e| e.hash != hash || &*e.name != name);
        let removed = self.entries.len() != before;
        if removed {
            self.change_counter += 1;
        }
        removed
    }

    /// Returns the value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<UniformValue> {
        let hash = uniform_name_hash(name);
        self.entries
            .iter()
            .find(|e| e.hash == hash && &*e.name == name)
            .map(|e| e.value)
    }

    /// Returns the entry at `index`.
    #[must_use]
    pub fn entry(&self, index: usize) -> Option<&UniformEntry> {
        self.entries.get(index)
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &UniformEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the layout change counter.
    #[must_use]
    pub fn change_counter(&self) -> u64 {
        self.change_counter
    }
}
