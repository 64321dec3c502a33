// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame uniform block storage.
//!
//! Uniform blocks are bump-allocated from fixed-size pages of GPU memory.
//! Writes land in a CPU staging copy of each page and reach the GPU in one
//! `write_buffer` per page on [`flush`](UniformBufferManager::flush). Pages
//! are reused every frame after [`reset`](UniformBufferManager::reset).

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use tableau_core::uniform::UniformValue;

use crate::graphics::{BufferHandle, BufferUsage, Controller, GraphicsError, UniformLocation};

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: u32 = 64 * 1024;

/// Default block alignment in bytes.
pub const DEFAULT_ALIGNMENT: u32 = 256;

/// A block range inside a uniform page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformBufferView {
    /// Page buffer.
    pub buffer: BufferHandle,
    /// Byte offset of the block.
    pub offset: u32,
    /// Size of the block.
    pub size: u32,
}

#[derive(Debug)]
struct Page {
    buffer: BufferHandle,
    staging: Vec<u8>,
    used: u32,
}

/// Bump allocator over uniform pages.
#[derive(Debug)]
pub struct UniformBufferManager {
    pages: Vec<Page>,
    current: usize,
    page_size: u32,
    alignment: u32,
    bytes_written: u64,
}

impl UniformBufferManager {
    /// Creates a manager with the given page size and alignment.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` is not a power of two.
    #[must_use]
    pub fn new(page_size: u32, alignment: u32) -> Self {
        assert!(
            alignment.is_power_of_two(),
            "uniform alignment must be a power of two"
        );
        Self {
            pages: Vec::new(),
            current: 0,
            page_size,
            alignment,
            bytes_written: 0,
        }
    }

    /// Allocates a block of `size` bytes.
    ///
    /// Blocks larger than the page size get a page of their own.
    pub fn allocate(
        &mut self,
        controller: &mut dyn Controller,
        size: u32,
    ) -> Result<UniformBufferView, GraphicsError> {
        while let Some(page) = self.pages.get_mut(self.current) {
            let offset = page.used.next_multiple_of(self.alignment);
            if offset + size <= u32::try_from(page.staging.len()).unwrap_or(u32::MAX) {
                page.used = offset + size;
                return Ok(UniformBufferView {
                    buffer: page.buffer,
                    offset,
                    size,
                });
            }
            self.current += 1;
        }

        let capacity = self.page_size.max(size);
        let buffer = controller.create_buffer(BufferUsage::Uniform, u64::from(capacity))?;
        log::debug!("uniform page {} of {capacity} bytes", self.pages.len());
        self.pages.push(Page {
            buffer,
            staging: vec![0; capacity as usize],
            used: size,
        });
        self.current = self.pages.len() - 1;
        Ok(UniformBufferView {
            buffer,
            offset: 0,
            size,
        })
    }

    /// Writes `value` at `offset` inside `view`.
    ///
    /// Writes falling outside the view are truncated.
    pub fn write(&mut self, view: UniformBufferView, offset: u32, value: &UniformValue) {
        self.write_bytes(view, offset, &value_bytes(value));
    }

    /// Writes `value` into a reflected block member.
    ///
    /// A `Mat3` is written padded when the member has room for it and
    /// packed otherwise. Returns `false`, writing nothing, when the value
    /// does not fit the member.
    pub fn write_member(
        &mut self,
        view: UniformBufferView,
        location: UniformLocation,
        value: &UniformValue,
    ) -> bool {
        let padded = value_bytes(value);
        let bytes = if padded.len() <= location.size as usize {
            padded
        } else if value_size(value) <= location.size {
            packed_bytes(value)
        } else {
            return false;
        };
        self.write_bytes(view, location.offset, &bytes);
        true
    }

    fn write_bytes(&mut self, view: UniformBufferView, offset: u32, bytes: &[u8]) {
        let Some(page) = self.pages.iter_mut().find(|p| p.buffer == view.buffer) else {
            log::warn!("write to unknown uniform page {:?}", view.buffer);
            return;
        };
        let start = (view.offset + offset) as usize;
        let end = (view.offset + view.size) as usize;
        if start >= end {
            return;
        }
        let len = bytes.len().min(end - start);
        page.staging[start..start + len].copy_from_slice(&bytes[..len]);
        self.bytes_written += len as u64;
    }

    /// Uploads every page used this frame.
    pub fn flush(&mut self, controller: &mut dyn Controller) -> Result<(), GraphicsError> {
        for page in self.pages.iter().filter(|p| p.used > 0) {
            controller.write_buffer(page.buffer, 0, &page.staging[..page.used as usize])?;
        }
        Ok(())
    }

    /// Makes every page available again for a new frame.
    pub fn reset(&mut self) {
        for page in &mut self.pages {
            page.used = 0;
        }
        self.current = 0;
        self.bytes_written = 0;
    }

    /// Bytes written since the last reset.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Number of pages allocated so far.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Destroys every page.
    pub fn destroy(&mut self, controller: &mut dyn Controller) {
        for page in self.pages.drain(..) {
            controller.destroy_buffer(page.buffer);
        }
        self.current = 0;
    }
}

impl Default for UniformBufferManager {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, DEFAULT_ALIGNMENT)
    }
}

/// Raw bytes of a value as laid out in a uniform block.
///
/// `Mat3` columns are padded to 16 bytes.
fn value_bytes(value: &UniformValue) -> Vec<u8> {
    match value {
        UniformValue::Float(v) => bytemuck::bytes_of(v).to_vec(),
        UniformValue::Int(v) => bytemuck::bytes_of(v).to_vec(),
        UniformValue::Vec2(v) => bytemuck::bytes_of::<Vec2>(v).to_vec(),
        UniformValue::Vec3(v) => bytemuck::bytes_of::<Vec3>(v).to_vec(),
        UniformValue::Vec4(v) => bytemuck::bytes_of::<Vec4>(v).to_vec(),
        UniformValue::Mat3(m) => {
            let padded: [Vec4; 3] = [m.x_axis.extend(0.0), m.y_axis.extend(0.0), m.z_axis.extend(0.0)];
            bytemuck::cast_slice(&padded).to_vec()
        }
        UniformValue::Mat4(m) => bytemuck::bytes_of::<Mat4>(m).to_vec(),
    }
}

/// Raw bytes of a value without `Mat3` column padding.
fn packed_bytes(value: &UniformValue) -> Vec<u8> {
    match value {
        UniformValue::Mat3(m) => bytemuck::bytes_of::<Mat3>(m).to_vec(),
        other => value_bytes(other),
    }
}

/// Returns the packed size of a value, ignoring `Mat3` padding.
#[must_use]
pub fn value_size(value: &UniformValue) -> u32 {
    match value {
        UniformValue::Float(_) | UniformValue::Int(_) => 4,
        UniformValue::Vec2(_) => 8,
        UniformValue::Vec3(_) => 12,
        UniformValue::Vec4(_) => 16,
        UniformValue::Mat3(_) => u32::try_from(size_of::<Mat3>()).unwrap_or(36),
        UniformValue::Mat4(_) => 64,
    }
}
