// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Program cache.
//!
//! Programs are keyed by a 64-bit hash of their render pass tag and stage
//! sources, so shaders with identical sources share one program. Each
//! shader stage is compiled once per source hash.

use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use tableau_core::resource::{ShaderData, ShaderId, ShaderSource};

use crate::graphics::{
    Controller, GraphicsError, ProgramHandle, ProgramReflection, ShaderHandle, ShaderStage,
};
use crate::pipeline_cache::PipelineCache;

/// A linked program with its reflection.
#[derive(Clone, Debug)]
pub struct Program {
    /// Backend handle.
    pub handle: ProgramHandle,
    /// Hash of the sources the program was built from.
    pub hash: u64,
    /// Uniform layout.
    pub reflection: Arc<ProgramReflection>,
}

/// Hashes the sources of one render pass.
#[must_use]
pub fn program_hash(source: &ShaderSource) -> u64 {
    let mut hasher = DefaultHasher::new();
    source.render_pass_tag.hash(&mut hasher);
    source.vertex.hash(&mut hasher);
    source.fragment.hash(&mut hasher);
    hasher.finish()
}

fn stage_hash(stage: ShaderStage, source: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    stage.hash(&mut hasher);
    source.hash(&mut hasher);
    hasher.finish()
}

/// Programs and compiled stages by source hash.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: HashMap<u64, Program>,
    /// Compiled stages with the number of programs linking them.
    stages: HashMap<u64, (ShaderHandle, u32)>,
    /// Vertex and fragment stage hashes of each program.
    program_stages: HashMap<u64, [u64; 2]>,
    /// Shaders that resolved to each program hash.
    users: HashMap<u64, HashSet<ShaderId>>,
    created: u32,
}

impl ProgramCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the program of `shader` for `render_pass_tag`, creating it
    /// on first use.
    ///
    /// Returns `Ok(None)` when the shader has neither a source for the tag
    /// nor a default source.
    pub fn get_or_create(
        &mut self,
        controller: &mut dyn Controller,
        shader: ShaderId,
        data: &ShaderData,
        render_pass_tag: u32,
    ) -> Result<Option<Program>, GraphicsError> {
        let Some(source) = data.source_for(render_pass_tag) else {
            return Ok(None);
        };
        let hash = program_hash(source);
        self.users.entry(hash).or_default().insert(shader);
        if let Some(program) = self.programs.get(&hash) {
            return Ok(Some(program.clone()));
        }

        let (vertex_hash, vertex) = self.stage(controller, ShaderStage::Vertex, &source.vertex)?;
        let (fragment_hash, fragment) =
            self.stage(controller, ShaderStage::Fragment, &source.fragment)?;
        let handle = controller.create_program(vertex, fragment)?;
        let reflection = match controller.program_reflection(handle) {
            Ok(reflection) => Arc::new(reflection),
            Err(err) => {
                controller.destroy_program(handle);
                return Err(err);
            }
        };
        for stage in [vertex_hash, fragment_hash] {
            if let Some((_, users)) = self.stages.get_mut(&stage) {
                *users += 1;
            }
        }
        self.program_stages.insert(hash, [vertex_hash, fragment_hash]);
        let program = Program {
            handle,
            hash,
            reflection,
        };
        log::debug!("created {handle:?} for {shader:?}, pass {render_pass_tag}");
        self.created += 1;
        self.programs.insert(hash, program.clone());
        Ok(Some(program))
    }

    /// Forgets `shader` and destroys programs no other shader resolves to,
    /// along with their pipelines and any stage no remaining program links.
    ///
    /// Returns the destroyed programs.
    pub fn release_shader(
        &mut self,
        controller: &mut dyn Controller,
        pipelines: &mut PipelineCache,
        shader: ShaderId,
    ) -> Vec<ProgramHandle> {
        let mut dropped = Vec::new();
        self.users.retain(|hash, users| {
            users.remove(&shader);
            if users.is_empty() {
                dropped.push(*hash);
                false
            } else {
                true
            }
        });

        let mut destroyed = Vec::with_capacity(dropped.len());
        for hash in dropped {
            let Some(program) = self.programs.remove(&hash) else {
                continue;
            };
            pipelines.invalidate_program(controller, program.handle);
            controller.destroy_program(program.handle);
            log::debug!("destroyed {:?} with its last shader {shader:?}", program.handle);
            destroyed.push(program.handle);
            for stage in self.program_stages.remove(&hash).into_iter().flatten() {
                self.release_stage(controller, stage);
            }
        }
        destroyed
    }

    /// Number of cached programs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Returns whether no program is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Number of compiled stages held.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns and resets the number of programs created since the last
    /// call.
    pub fn take_created(&mut self) -> u32 {
        core::mem::take(&mut self.created)
    }

    /// Returns the compiled stage for `source` with its hash, compiling it
    /// on first use.
    fn stage(
        &mut self,
        controller: &mut dyn Controller,
        stage: ShaderStage,
        source: &str,
    ) -> Result<(u64, ShaderHandle), GraphicsError> {
        let hash = stage_hash(stage, source);
        if let Some(&(handle, _)) = self.stages.get(&hash) {
            return Ok((hash, handle));
        }
        let handle = controller.create_shader(stage, source)?;
        self.stages.insert(hash, (handle, 0));
        Ok((hash, handle))
    }

    fn release_stage(&mut self, controller: &mut dyn Controller, hash: u64) {
        let Some((handle, users)) = self.stages.get_mut(&hash) else {
            return;
        };
        *users = users.saturating_sub(1);
        if *users == 0 {
            controller.destroy_shader(*handle);
            self.stages.remove(&hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use tableau_core::resource::ShaderHints;

    use super::*;
    use crate::testing::{RecordingController, handle};

    fn shader(idx: u32) -> ShaderId {
        handle(idx)
    }

    #[test]
    fn identical_sources_share_one_program() {
        let mut gpu = RecordingController::new();
        let mut cache = ProgramCache::new();
        let data = ShaderData::new("vs", "fs", ShaderHints::empty());

        let a = cache
            .get_or_create(&mut gpu, shader(0), &data, 0)
            .unwrap()
            .unwrap();
        let b = cache
            .get_or_create(&mut gpu, shader(1), &data.clone(), 0)
            .unwrap()
            .unwrap();
        assert_eq!(a.handle, b.handle);
        assert_eq!(gpu.programs_created, 1);
        assert_eq!(gpu.shaders_created, 2);
        assert_eq!(cache.take_created(), 1);
        assert_eq!(cache.take_created(), 0);
    }

    #[test]
    fn stages_are_compiled_once_per_source() {
        let mut gpu = RecordingController::new();
        let mut cache = ProgramCache::new();
        let a = ShaderData::new("vs", "fs-a", ShaderHints::empty());
        let b = ShaderData::new("vs", "fs-b", ShaderHints::empty());
        let _ = cache.get_or_create(&mut gpu, shader(0), &a, 0).unwrap();
        let _ = cache.get_or_create(&mut gpu, shader(1), &b, 0).unwrap();
        assert_eq!(gpu.programs_created, 2);
        assert_eq!(gpu.shaders_created, 3, "vertex stage shared");
    }

    #[test]
    fn unknown_pass_falls_back_to_default_source() {
        let mut gpu = RecordingController::new();
        let mut cache = ProgramCache::new();
        let data = ShaderData::new("vs", "fs", ShaderHints::empty()).with_pass(7, "vs7", "fs7");

        let default = cache.get_or_create(&mut gpu, shader(0), &data, 0).unwrap().unwrap();
        let fallback = cache.get_or_create(&mut gpu, shader(0), &data, 3).unwrap().unwrap();
        let tagged = cache.get_or_create(&mut gpu, shader(0), &data, 7).unwrap().unwrap();
        assert_eq!(default.handle, fallback.handle);
        assert_ne!(default.handle, tagged.handle);
    }

    #[test]
    fn missing_source_is_not_an_error() {
        let mut gpu = RecordingController::new();
        let mut cache = ProgramCache::new();
        let data = ShaderData::empty(ShaderHints::empty());
        assert!(cache.get_or_create(&mut gpu, shader(0), &data, 0).unwrap().is_none());
        assert_eq!(gpu.programs_created, 0);
    }

    #[test]
    fn compile_failures_propagate() {
        let mut gpu = RecordingController::new();
        gpu.fail_shaders = true;
        let mut cache = ProgramCache::new();
        let data = ShaderData::new("vs", "fs", ShaderHints::empty());
        let err = cache.get_or_create(&mut gpu, shader(0), &data, 0).unwrap_err();
        assert!(matches!(err, GraphicsError::ShaderCompilation(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn programs_are_destroyed_with_their_last_shader() {
        let mut gpu = RecordingController::new();
        let mut cache = ProgramCache::new();
        let mut pipelines = PipelineCache::new();
        let data = ShaderData::new("vs", "fs", ShaderHints::empty());
        let program = cache.get_or_create(&mut gpu, shader(0), &data, 0).unwrap().unwrap();
        let _ = cache.get_or_create(&mut gpu, shader(1), &data, 0).unwrap();

        assert!(cache.release_shader(&mut gpu, &mut pipelines, shader(0)).is_empty());
        assert!(gpu.programs_destroyed.is_empty());
        assert_eq!(
            cache.release_shader(&mut gpu, &mut pipelines, shader(1)),
            vec![program.handle]
        );
        assert!(cache.is_empty());
        assert_eq!(gpu.programs_destroyed, vec![program.handle]);
        assert_eq!(gpu.shaders_destroyed.len(), 2);
        assert_eq!(cache.stage_count(), 0);
    }

    #[test]
    fn shared_stages_outlive_one_program() {
        let mut gpu = RecordingController::new();
        let mut cache = ProgramCache::new();
        let mut pipelines = PipelineCache::new();
        let a = ShaderData::new("vs", "fs-a", ShaderHints::empty());
        let b = ShaderData::new("vs", "fs-b", ShaderHints::empty());
        let _ = cache.get_or_create(&mut gpu, shader(0), &a, 0).unwrap();
        let _ = cache.get_or_create(&mut gpu, shader(1), &b, 0).unwrap();
        assert_eq!(cache.stage_count(), 3);

        let _ = cache.release_shader(&mut gpu, &mut pipelines, shader(0));
        assert_eq!(gpu.shaders_destroyed.len(), 1, "vertex stage still linked");
        assert_eq!(cache.stage_count(), 2);

        let _ = cache.get_or_create(&mut gpu, shader(2), &a, 0).unwrap();
        assert_eq!(gpu.shaders_created, 4, "only the fragment stage recompiles");
    }
}
