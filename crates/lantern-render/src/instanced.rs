use bytemuck::Zeroable;
use glam::Mat4;
use rayon::prelude::*;

use crate::arena::GpuHandle;
use crate::backend::{BindGroupDesc, BindGroupKey, InstancedDraw, PipelineDesc, PipelineKey, RenderBackend};
use crate::context::SceneRenderer;
use crate::error::RenderResult;
use crate::frame::FrameLabel;
use crate::scene::{Camera, MeshKey, Model, Scene};
use crate::settings::RenderSettings;
use crate::uniforms::{
    DirLightGpu, InstanceRecord, LightingBlock, MaterialBlock, PointLightGpu, ToggleBlock,
    TransformBlock, MAX_DIR_LIGHTS, MAX_POINT_LIGHTS,
};

/// Group models by mesh identity, preserving first-appearance order of
/// meshes and scene order of models within a group.
fn group_by_mesh(models: &[Model]) -> Vec<(MeshKey, Vec<usize>)> {
    let mut groups: Vec<(MeshKey, Vec<usize>)> = Vec::new();
    for (index, model) in models.iter().enumerate() {
        match groups.iter_mut().find(|(mesh, _)| *mesh == model.mesh) {
            Some((_, indices)) => indices.push(index),
            None => groups.push((model.mesh, vec![index])),
        }
    }
    groups
}

/// Lights go up in camera space; the shader never sees world space.
/// Anything past the fixed array sizes is dropped.
fn lighting_block(scene: &Scene, view: Mat4) -> LightingBlock {
    let mut block = LightingBlock::zeroed();
    for (i, light) in scene.point_lights.iter().take(MAX_POINT_LIGHTS).enumerate() {
        block.point_lights[i] = PointLightGpu {
            position: view * light.position.extend(1.0),
            color: light.color.extend(1.0),
            attenuation: light.attenuation.extend(0.0),
        };
    }
    block.point_count = scene.point_lights.len().min(MAX_POINT_LIGHTS) as u32;

    for (i, light) in scene.dir_lights.iter().take(MAX_DIR_LIGHTS).enumerate() {
        block.dir_lights[i] = DirLightGpu {
            direction: view * light.direction.extend(0.0),
            color: light.color.extend(1.0),
        };
    }
    block.dir_count = scene.dir_lights.len().min(MAX_DIR_LIGHTS) as u32;
    block
}

/// The uniform buffers shared by every group, one set per frame slot.
struct SlotUniforms {
    transform: GpuHandle,
    lighting: GpuHandle,
    toggles: GpuHandle,
}

/// One mesh's worth of instances. Per-slot buffers and bind groups so slot
/// k+1 can be written while the GPU still reads slot k.
struct InstanceGroup {
    model_indices: Vec<usize>,
    vertex_buffer: GpuHandle,
    index_buffer: GpuHandle,
    index_count: u32,
    material_block: MaterialBlock,
    has_material: bool,
    instance_buffers: Vec<GpuHandle>,
    material_buffers: Vec<GpuHandle>,
    bind_groups: Vec<BindGroupKey>,
}

/// Draws every model in the scene, one instanced draw per distinct mesh.
///
/// Groups are rebuilt wholesale whenever the scene's mesh→model membership
/// changes; transform-only edits reuse the existing buffers. Per-instance
/// matrices are recomputed in parallel every frame into the current slot's
/// buffer.
pub struct InstancedMeshRenderer {
    pipeline: PipelineKey,
    slot_uniforms: Vec<SlotUniforms>,
    groups: Vec<InstanceGroup>,
    built_generation: Option<u64>,
    pub toggles: ToggleBlock,
}

impl InstancedMeshRenderer {
    pub fn new<B: RenderBackend>(backend: &mut B, settings: &RenderSettings) -> RenderResult<Self> {
        let pipeline = backend.create_pipeline(
            &PipelineDesc {
                vertex_shader: settings.shader_dir.join("mesh.vert.spv"),
                fragment_shader: settings.shader_dir.join("mesh.frag.spv"),
            },
            "instanced-mesh-pipeline",
        )?;

        let slots = backend.frames_in_flight();
        let slot_uniforms = (0..slots)
            .map(|slot| {
                let label = FrameLabel(slot);
                Ok(SlotUniforms {
                    transform: backend.create_uniform_buffer(
                        std::mem::size_of::<TransformBlock>() as u64,
                        &format!("transform-ubo-{label}"),
                    )?,
                    lighting: backend.create_uniform_buffer(
                        std::mem::size_of::<LightingBlock>() as u64,
                        &format!("lighting-ubo-{label}"),
                    )?,
                    toggles: backend.create_uniform_buffer(
                        std::mem::size_of::<ToggleBlock>() as u64,
                        &format!("toggle-ubo-{label}"),
                    )?,
                })
            })
            .collect::<RenderResult<Vec<_>>>()?;

        Ok(Self {
            pipeline,
            slot_uniforms,
            groups: Vec::new(),
            built_generation: None,
            toggles: ToggleBlock::default(),
        })
    }

    fn release_groups<B: RenderBackend>(&mut self, backend: &mut B) {
        for group in self.groups.drain(..) {
            for handle in group.instance_buffers.into_iter().chain(group.material_buffers) {
                backend.destroy_object(handle);
            }
            for key in group.bind_groups {
                backend.destroy_bind_group(key);
            }
        }
    }

    /// Throw away the old grouping and build it again from the scene. The
    /// per-slot instance buffer of a group holds exactly one record per
    /// model at the time of the rebuild.
    fn rebuild_groups<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        scene: &Scene,
    ) -> RenderResult<()> {
        self.release_groups(backend);

        let slots = backend.frames_in_flight();
        for (group_index, (mesh_key, model_indices)) in
            group_by_mesh(scene.models()).into_iter().enumerate()
        {
            let mesh = scene.mesh(mesh_key).expect("model references a dead mesh");
            let material_block = mesh
                .material
                .as_ref()
                .map(|m| m.to_block())
                .unwrap_or_else(MaterialBlock::zeroed);

            let mut instance_buffers = Vec::with_capacity(slots);
            let mut material_buffers = Vec::with_capacity(slots);
            let mut bind_groups = Vec::with_capacity(slots);
            for slot in 0..slots {
                let label = FrameLabel(slot);
                let instance_size =
                    (model_indices.len() * std::mem::size_of::<InstanceRecord>()) as u64;
                let instance_buffer = backend.create_instance_buffer(
                    instance_size,
                    &format!("group{group_index}-instances-{label}"),
                )?;
                let material_buffer = backend.create_uniform_buffer(
                    std::mem::size_of::<MaterialBlock>() as u64,
                    &format!("group{group_index}-material-{label}"),
                )?;
                let bind_group = backend.create_bind_group(
                    &BindGroupDesc {
                        transform: self.slot_uniforms[slot].transform,
                        lighting: self.slot_uniforms[slot].lighting,
                        material: material_buffer,
                        toggles: self.slot_uniforms[slot].toggles,
                        base_color_map: mesh.material.as_ref().and_then(|m| m.base_color_map),
                        normal_map: mesh.material.as_ref().and_then(|m| m.normal_map),
                    },
                    &format!("group{group_index}-bind-{label}"),
                )?;
                instance_buffers.push(instance_buffer);
                material_buffers.push(material_buffer);
                bind_groups.push(bind_group);
            }

            self.groups.push(InstanceGroup {
                model_indices,
                vertex_buffer: mesh.vertex_buffer,
                index_buffer: mesh.index_buffer,
                index_count: mesh.index_count,
                material_block,
                has_material: mesh.material.is_some(),
                instance_buffers,
                material_buffers,
                bind_groups,
            });
        }

        self.built_generation = Some(scene.membership_generation());
        log::debug!("instance groups rebuilt: {} groups", self.groups.len());
        Ok(())
    }
}

impl<B: RenderBackend> SceneRenderer<B> for InstancedMeshRenderer {
    fn render(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        camera: &Camera,
        slot: FrameLabel,
    ) -> RenderResult<()> {
        if self.built_generation != Some(scene.membership_generation()) {
            self.rebuild_groups(backend, scene)?;
        }

        let slot_index = slot.index();
        let uniforms = &self.slot_uniforms[slot_index];
        let transform = TransformBlock {
            view: camera.view,
            proj: camera.proj,
            camera_pos: camera.position.extend(1.0),
        };
        backend.write_buffer(uniforms.transform, 0, bytemuck::bytes_of(&transform))?;
        let lighting = lighting_block(scene, camera.view);
        backend.write_buffer(uniforms.lighting, 0, bytemuck::bytes_of(&lighting))?;
        backend.write_buffer(uniforms.toggles, 0, bytemuck::bytes_of(&self.toggles))?;

        let models = scene.models();
        for group in &self.groups {
            // disjoint output slots, order across models irrelevant
            let records: Vec<InstanceRecord> = group
                .model_indices
                .par_iter()
                .map(|&index| InstanceRecord::compute(models[index].transform, camera.view))
                .collect();
            backend.write_buffer(
                group.instance_buffers[slot_index],
                0,
                bytemuck::cast_slice(&records),
            )?;
            backend.write_buffer(
                group.material_buffers[slot_index],
                0,
                bytemuck::bytes_of(&group.material_block),
            )?;

            if !group.has_material || group.model_indices.is_empty() {
                continue;
            }
            backend.draw_instanced(
                slot,
                &InstancedDraw {
                    pipeline: self.pipeline,
                    bind_group: group.bind_groups[slot_index],
                    vertex_buffer: group.vertex_buffer,
                    instance_buffer: group.instance_buffers[slot_index],
                    index_buffer: group.index_buffer,
                    index_count: group.index_count,
                    instance_count: group.model_indices.len() as u32,
                },
            );
        }
        Ok(())
    }

    fn release(&mut self, backend: &mut B) {
        self.release_groups(backend);
        for uniforms in self.slot_uniforms.drain(..) {
            backend.destroy_object(uniforms.transform);
            backend.destroy_object(uniforms.lighting);
            backend.destroy_object(uniforms.toggles);
        }
        self.built_generation = None;
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec3, Vec4};
    use slotmap::SlotMap;

    use super::*;
    use crate::scene::{DirLight, PointLight};

    fn mesh_keys(count: usize) -> Vec<MeshKey> {
        let mut pool: SlotMap<MeshKey, ()> = SlotMap::with_key();
        (0..count).map(|_| pool.insert(())).collect()
    }

    #[test]
    fn grouping_preserves_first_appearance_order() {
        let keys = mesh_keys(2);
        let models: Vec<Model> = [keys[0], keys[1], keys[0], keys[1], keys[0]]
            .iter()
            .map(|&mesh| Model {
                mesh,
                transform: Mat4::IDENTITY,
            })
            .collect();

        let groups = group_by_mesh(&models);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], (keys[0], vec![0, 2, 4]));
        assert_eq!(groups[1], (keys[1], vec![1, 3]));
    }

    #[test]
    fn grouping_of_empty_scene_is_empty() {
        assert!(group_by_mesh(&[]).is_empty());
    }

    #[test]
    fn lighting_is_transformed_to_camera_space() {
        let mut scene = Scene::new();
        scene.point_lights.push(PointLight {
            position: Vec3::new(1.0, 0.0, 0.0),
            color: Vec3::ONE,
            attenuation: Vec3::new(1.0, 0.09, 0.032),
        });
        scene.dir_lights.push(DirLight {
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
        });
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));

        let block = lighting_block(&scene, view);
        assert_eq!(block.point_count, 1);
        assert_eq!(block.dir_count, 1);
        assert_eq!(block.point_lights[0].position, Vec4::new(1.0, 0.0, -5.0, 1.0));
        // directions ignore translation (w = 0)
        assert_eq!(block.dir_lights[0].direction, Vec4::new(0.0, -1.0, 0.0, 0.0));
    }

    #[test]
    fn lighting_clamps_to_fixed_capacity() {
        let mut scene = Scene::new();
        for i in 0..MAX_POINT_LIGHTS + 3 {
            scene.point_lights.push(PointLight {
                position: Vec3::splat(i as f32),
                color: Vec3::ONE,
                attenuation: Vec3::ONE,
            });
        }
        let block = lighting_block(&scene, Mat4::IDENTITY);
        assert_eq!(block.point_count, MAX_POINT_LIGHTS as u32);
    }
}
