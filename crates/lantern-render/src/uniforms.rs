//! Host-side mirrors of the shader uniform blocks and vertex streams.
//!
//! Layouts follow std140: every member is vec4-aligned, counts are padded to
//! 16 bytes. All types are `Pod` so whole blocks go to mapped memory with a
//! single `bytemuck::bytes_of`.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec4};

pub const MAX_POINT_LIGHTS: usize = 4;
pub const MAX_DIR_LIGHTS: usize = 2;

/// Per-vertex stream, binding 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Per-instance stream, binding 1. Recomputed every frame from the camera
/// view and the model's transform; never persisted across frames.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceRecord {
    pub model: Mat4,
    pub model_view: Mat4,
    /// Inverse-transpose of the upper 3x3 of model-view, carried as a full
    /// mat4 to keep the vertex stream vec4-aligned.
    pub normal: Mat4,
}

impl InstanceRecord {
    pub fn compute(model: Mat4, view: Mat4) -> Self {
        let model_view = view * model;
        let normal = Mat4::from_mat3(Mat3::from_mat4(model_view).inverse().transpose());
        Self {
            model,
            model_view,
            normal,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TransformBlock {
    pub view: Mat4,
    pub proj: Mat4,
    pub camera_pos: Vec4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PointLightGpu {
    /// Camera-space position.
    pub position: Vec4,
    pub color: Vec4,
    /// x = constant, y = linear, z = quadratic.
    pub attenuation: Vec4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DirLightGpu {
    /// Camera-space direction.
    pub direction: Vec4,
    pub color: Vec4,
}

/// Light arrays are fixed-size; only the first `*_count` entries are live.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightingBlock {
    pub point_lights: [PointLightGpu; MAX_POINT_LIGHTS],
    pub dir_lights: [DirLightGpu; MAX_DIR_LIGHTS],
    pub point_count: u32,
    pub dir_count: u32,
    pub _pad: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialBlock {
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub shininess: f32,
    pub has_base_color_map: u32,
    pub has_normal_map: u32,
    pub _pad: u32,
}

/// Per-frame debug switches, host-toggled.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ToggleBlock {
    pub attenuation: u32,
    pub gamma_correction: u32,
    pub tone_mapping: u32,
    pub _pad: u32,
}

impl Default for ToggleBlock {
    fn default() -> Self {
        Self {
            attenuation: 1,
            gamma_correction: 1,
            tone_mapping: 1,
            _pad: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    #[test]
    fn instance_record_identity() {
        let record = InstanceRecord::compute(Mat4::IDENTITY, Mat4::IDENTITY);
        assert_eq!(record.model, Mat4::IDENTITY);
        assert_eq!(record.model_view, Mat4::IDENTITY);
        assert_eq!(record.normal, Mat4::IDENTITY);
    }

    #[test]
    fn normal_matrix_undoes_nonuniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let record = InstanceRecord::compute(model, Mat4::IDENTITY);

        // a normal on the scaled axis must come back unit-length after
        // normalization, and the inverse-transpose divides by the scale
        let n = Mat3::from_mat4(record.normal) * Vec3::X;
        assert!((n.x - 0.5).abs() < 1e-6);
        assert!(n.y.abs() < 1e-6 && n.z.abs() < 1e-6);
    }

    #[test]
    fn model_view_composes_in_order() {
        let model = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let view = Mat4::from_translation(Vec3::new(0.0, -3.0, 0.0));
        let record = InstanceRecord::compute(model, view);
        let p = record.model_view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert_eq!(p, Vec4::new(1.0, -3.0, 0.0, 1.0));
    }

    #[test]
    fn block_sizes_are_vec4_aligned() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(std::mem::size_of::<InstanceRecord>(), 192);
        assert_eq!(std::mem::size_of::<TransformBlock>() % 16, 0);
        assert_eq!(std::mem::size_of::<LightingBlock>() % 16, 0);
        assert_eq!(std::mem::size_of::<MaterialBlock>() % 16, 0);
        assert_eq!(std::mem::size_of::<ToggleBlock>() % 16, 0);
    }
}
