// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pipeline cache.
//!
//! A pipeline is fully determined by a [`PipelineKey`]; asking for the same
//! key twice returns the same handle without touching the backend. Entries
//! are dropped when their program or geometry goes away.

use tableau_core::renderer::FaceCullMode;
use tableau_core::resource::{GeometryDesc, GeometryId};

use crate::graphics::{
    ColorBlendState, Controller, GraphicsError, PipelineCreateInfo, PipelineHandle, ProgramHandle,
    RenderTarget,
};

/// Everything a pipeline depends on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineKey {
    /// Linked program.
    pub program: ProgramHandle,
    /// Geometry providing vertex layout and topology.
    pub geometry: GeometryId,
    /// Blend state; `None` when blending is off.
    pub blend: Option<ColorBlendState>,
    /// Faces culled, already flipped for reflections.
    pub cull_mode: FaceCullMode,
    /// Render target.
    pub target: RenderTarget,
}

/// Swaps front and back culling for a mirrored camera.
#[must_use]
pub fn reflected_cull_mode(mode: FaceCullMode, reflection: bool) -> FaceCullMode {
    match (mode, reflection) {
        (FaceCullMode::Front, true) => FaceCullMode::Back,
        (FaceCullMode::Back, true) => FaceCullMode::Front,
        (mode, _) => mode,
    }
}

/// Pipelines by key.
#[derive(Debug, Default)]
pub struct PipelineCache {
    entries: Vec<(PipelineKey, PipelineHandle)>,
    created: u32,
}

impl PipelineCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pipeline for `key`, creating it on first use.
    pub fn get_or_create(
        &mut self,
        controller: &mut dyn Controller,
        key: PipelineKey,
        geometry: &GeometryDesc,
    ) -> Result<PipelineHandle, GraphicsError> {
        if let Some(&(_, handle)) = self.entries.iter().find(|(k, _)| *k == key) {
            return Ok(handle);
        }
        let info = PipelineCreateInfo {
            program: key.program,
            vertex_buffers: &geometry.vertex_buffers,
            topology: geometry.topology,
            blend: key.blend,
            cull_mode: key.cull_mode,
            target: key.target,
        };
        let handle = controller.create_pipeline(&info)?;
        self.entries.push((key, handle));
        self.created += 1;
        Ok(handle)
    }

    /// Destroys pipelines built with `program`.
    pub fn invalidate_program(&mut self, controller: &mut dyn Controller, program: ProgramHandle) {
        self.invalidate(controller, |k| k.program == program);
    }

    /// Destroys pipelines built for `geometry`.
    pub fn invalidate_geometry(&mut self, controller: &mut dyn Controller, geometry: GeometryId) {
        self.invalidate(controller, |k| k.geometry == geometry);
    }

    /// Number of cached pipelines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no pipeline is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns and resets the number of pipelines created since the last
    /// call.
    pub fn take_created(&mut self) -> u32 {
        core::mem::take(&mut self.created)
    }

    fn invalidate(
        &mut self,
        controller: &mut dyn Controller,
        mut matches: impl FnMut(&PipelineKey) -> bool,
    ) {
        self.entries.retain(|(key, handle)| {
            if matches(key) {
                controller.destroy_pipeline(*handle);
                false
            } else {
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use tableau_core::renderer::BlendOptions;

    use super::*;
    use crate::testing::{RecordingController, handle};

    fn key(program: u32, geometry: u32) -> PipelineKey {
        PipelineKey {
            program: ProgramHandle(program),
            geometry: handle(geometry),
            blend: None,
            cull_mode: FaceCullMode::None,
            target: RenderTarget::Surface,
        }
    }

    #[test]
    fn equal_keys_share_a_pipeline() {
        let mut gpu = RecordingController::new();
        let mut cache = PipelineCache::new();
        let geometry = GeometryDesc::default();
        let a = cache.get_or_create(&mut gpu, key(1, 0), &geometry).unwrap();
        let b = cache.get_or_create(&mut gpu, key(1, 0), &geometry).unwrap();
        assert_eq!(a, b);
        assert_eq!(gpu.pipelines_created, 1);
        assert_eq!(cache.take_created(), 1);
    }

    #[test]
    fn blend_state_is_part_of_the_key() {
        let mut gpu = RecordingController::new();
        let mut cache = PipelineCache::new();
        let geometry = GeometryDesc::default();
        let opaque = cache.get_or_create(&mut gpu, key(1, 0), &geometry).unwrap();
        let blended = PipelineKey {
            blend: Some(ColorBlendState {
                options: BlendOptions::default(),
                premultiplied_alpha: false,
            }),
            ..key(1, 0)
        };
        let translucent = cache.get_or_create(&mut gpu, blended, &geometry).unwrap();
        assert_ne!(opaque, translucent);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidation_destroys_matching_pipelines() {
        let mut gpu = RecordingController::new();
        let mut cache = PipelineCache::new();
        let geometry = GeometryDesc::default();
        let a = cache.get_or_create(&mut gpu, key(1, 0), &geometry).unwrap();
        let b = cache.get_or_create(&mut gpu, key(2, 0), &geometry).unwrap();
        let c = cache.get_or_create(&mut gpu, key(2, 1), &geometry).unwrap();

        cache.invalidate_program(&mut gpu, ProgramHandle(1));
        assert_eq!(gpu.pipelines_destroyed, vec![a]);
        cache.invalidate_geometry(&mut gpu, handle(1));
        assert_eq!(gpu.pipelines_destroyed, vec![a, c]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_or_create(&mut gpu, key(2, 0), &geometry).unwrap(), b);
    }

    #[test]
    fn reflection_swaps_culled_faces() {
        assert_eq!(reflected_cull_mode(FaceCullMode::Back, true), FaceCullMode::Front);
        assert_eq!(reflected_cull_mode(FaceCullMode::Front, true), FaceCullMode::Back);
        assert_eq!(reflected_cull_mode(FaceCullMode::Back, false), FaceCullMode::Back);
        assert_eq!(
            reflected_cull_mode(FaceCullMode::FrontAndBack, true),
            FaceCullMode::FrontAndBack
        );
    }
}
