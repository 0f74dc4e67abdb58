use glam::{Mat4, Vec3, Vec4};
use slotmap::SlotMap;

use crate::arena::GpuHandle;
use crate::uniforms::MaterialBlock;

slotmap::new_key_type! {
    /// Mesh identity. Models sharing a key are drawn as one instanced batch.
    pub struct MeshKey;
}

/// Immutable surface description attached to a mesh. The renderer snapshots
/// it into GPU state at group creation and never re-reads it.
#[derive(Debug, Clone)]
pub struct Material {
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub shininess: f32,
    pub base_color_map: Option<GpuHandle>,
    pub normal_map: Option<GpuHandle>,
}

impl Material {
    pub fn to_block(&self) -> MaterialBlock {
        MaterialBlock {
            ambient: self.ambient,
            diffuse: self.diffuse,
            specular: self.specular,
            shininess: self.shininess,
            has_base_color_map: self.base_color_map.is_some() as u32,
            has_normal_map: self.normal_map.is_some() as u32,
            _pad: 0,
        }
    }
}

/// Geometry already resident on the GPU, referenced through arena handles.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertex_buffer: GpuHandle,
    pub index_buffer: GpuHandle,
    pub index_count: u32,
    /// Groups without a material are registered but skipped at draw time
    /// until one is attached.
    pub material: Option<Material>,
}

/// One drawable: a mesh reference plus its world transform.
#[derive(Debug, Clone, Copy)]
pub struct Model {
    pub mesh: MeshKey,
    pub transform: Mat4,
}

#[derive(Debug, Clone, Copy)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    /// constant, linear, quadratic.
    pub attenuation: Vec3,
}

#[derive(Debug, Clone, Copy)]
pub struct DirLight {
    pub direction: Vec3,
    pub color: Vec3,
}

#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub view: Mat4,
    pub proj: Mat4,
    pub position: Vec3,
}

impl Camera {
    pub fn look_at(position: Vec3, target: Vec3, aspect: f32) -> Self {
        Self {
            view: Mat4::look_at_rh(position, target, Vec3::Y),
            proj: Mat4::perspective_rh(60_f32.to_radians(), aspect, 0.1, 500.0),
            position,
        }
    }
}

/// Flat model list plus the meshes and lights it references. Not a scene
/// graph; transforms are already world-space.
///
/// `membership_generation` changes whenever the mesh→model grouping may have
/// changed, which is what tells the renderer to rebuild its instance groups.
/// Transform-only edits leave it untouched.
pub struct Scene {
    meshes: SlotMap<MeshKey, Mesh>,
    models: Vec<Model>,
    pub point_lights: Vec<PointLight>,
    pub dir_lights: Vec<DirLight>,
    membership_generation: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            meshes: SlotMap::with_key(),
            models: Vec::new(),
            point_lights: Vec::new(),
            dir_lights: Vec::new(),
            membership_generation: 0,
        }
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshKey {
        self.membership_generation += 1;
        self.meshes.insert(mesh)
    }

    #[inline]
    pub fn mesh(&self, key: MeshKey) -> Option<&Mesh> {
        self.meshes.get(key)
    }

    pub fn add_model(&mut self, model: Model) -> usize {
        self.membership_generation += 1;
        self.models.push(model);
        self.models.len() - 1
    }

    pub fn remove_model(&mut self, index: usize) -> Model {
        self.membership_generation += 1;
        self.models.remove(index)
    }

    /// Transform updates do not bump the generation; grouping is unchanged.
    pub fn set_model_transform(&mut self, index: usize, transform: Mat4) {
        self.models[index].transform = transform;
    }

    #[inline]
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    #[inline]
    pub fn membership_generation(&self) -> u64 {
        self.membership_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_mesh() -> Mesh {
        Mesh {
            vertex_buffer: GpuHandle::default(),
            index_buffer: GpuHandle::default(),
            index_count: 36,
            material: None,
        }
    }

    #[test]
    fn membership_tracks_adds_and_removes_only() {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(dummy_mesh());
        let g0 = scene.membership_generation();

        let index = scene.add_model(Model {
            mesh,
            transform: Mat4::IDENTITY,
        });
        assert!(scene.membership_generation() > g0);

        let g1 = scene.membership_generation();
        scene.set_model_transform(index, Mat4::from_scale(glam::Vec3::splat(2.0)));
        assert_eq!(scene.membership_generation(), g1);

        scene.remove_model(index);
        assert!(scene.membership_generation() > g1);
    }
}
