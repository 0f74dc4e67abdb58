//! Seam between frame orchestration and the GPU API.
//!
//! `VulkanBackend` is the production implementation; `HeadlessBackend`
//! mirrors its observable contract over plain memory so the frame loop and
//! the instanced renderer can run without a device.

mod headless;
mod vulkan;

use std::path::PathBuf;

use ash::vk;
use lantern_gfx::{AcquireResult, GfxResult, PresentResult};

use crate::arena::GpuHandle;
use crate::frame::FrameLabel;

pub use headless::{DrawRecord, HeadlessBackend};
pub use vulkan::{VulkanBackend, WindowBridge};

slotmap::new_key_type! {
    pub struct PipelineKey;
    pub struct BindGroupKey;
}

#[derive(Debug, Clone)]
pub struct PipelineDesc {
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

/// The uniform buffers and textures one instance group binds. Uniform
/// handles are per-slot; the caller passes the set for one slot at a time.
#[derive(Debug, Clone)]
pub struct BindGroupDesc {
    pub transform: GpuHandle,
    pub lighting: GpuHandle,
    pub material: GpuHandle,
    pub toggles: GpuHandle,
    pub base_color_map: Option<GpuHandle>,
    pub normal_map: Option<GpuHandle>,
}

/// One instanced, indexed draw. Everything is pre-validated by the renderer;
/// the backend binds and draws without further checks.
#[derive(Debug, Clone)]
pub struct InstancedDraw {
    pub pipeline: PipelineKey,
    pub bind_group: BindGroupKey,
    pub vertex_buffer: GpuHandle,
    pub instance_buffer: GpuHandle,
    pub index_buffer: GpuHandle,
    pub index_count: u32,
    pub instance_count: u32,
}

pub trait RenderBackend {
    fn frames_in_flight(&self) -> usize;

    // frame synchronization, in call order
    fn wait_slot(&mut self, slot: FrameLabel) -> GfxResult<()>;
    fn acquire_image(&mut self, slot: FrameLabel) -> GfxResult<AcquireResult>;
    /// Reset the slot's fence and open its command buffer. Only called after
    /// a successful acquire.
    fn begin_recording(
        &mut self,
        slot: FrameLabel,
        image_index: u32,
        clear_color: [f32; 4],
    ) -> GfxResult<()>;
    fn submit(&mut self, slot: FrameLabel, image_index: u32) -> GfxResult<()>;
    fn present(&mut self, slot: FrameLabel, image_index: u32) -> GfxResult<PresentResult>;
    fn wait_idle(&mut self);

    // surface state
    fn drawable_extent(&self) -> vk::Extent2D;
    /// Poll window events once. Used by the zero-extent recovery loop.
    fn pump_events(&mut self);
    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> GfxResult<()>;
    fn swapchain_extent(&self) -> vk::Extent2D;

    // tracked resources
    fn create_vertex_buffer(&mut self, data: &[u8], debug_name: &str) -> GfxResult<GpuHandle>;
    fn create_index_buffer(&mut self, data: &[u8], debug_name: &str) -> GfxResult<GpuHandle>;
    fn create_instance_buffer(&mut self, size: u64, debug_name: &str) -> GfxResult<GpuHandle>;
    fn create_uniform_buffer(&mut self, size: u64, debug_name: &str) -> GfxResult<GpuHandle>;
    fn create_texture(
        &mut self,
        extent: vk::Extent2D,
        rgba8_pixels: &[u8],
        debug_name: &str,
    ) -> GfxResult<GpuHandle>;
    fn write_buffer(&mut self, handle: GpuHandle, offset: usize, bytes: &[u8]) -> GfxResult<()>;
    /// Snapshot of a host-visible buffer's contents, as the draw would see
    /// them.
    fn buffer_bytes(&self, handle: GpuHandle) -> Vec<u8>;
    /// Returns whether the handle was still live. A second destroy through
    /// the same handle is a no-op returning false.
    fn destroy_object(&mut self, handle: GpuHandle) -> bool;
    fn is_valid_object(&self, handle: GpuHandle) -> bool;

    // pipelines & binding
    fn create_pipeline(&mut self, desc: &PipelineDesc, debug_name: &str) -> GfxResult<PipelineKey>;
    fn create_bind_group(&mut self, desc: &BindGroupDesc, debug_name: &str) -> GfxResult<BindGroupKey>;
    fn destroy_bind_group(&mut self, key: BindGroupKey);

    fn draw_instanced(&mut self, slot: FrameLabel, draw: &InstancedDraw);
}
