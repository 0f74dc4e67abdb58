use std::collections::VecDeque;

use ash::vk;
use lantern_gfx::{AcquireResult, GfxResult, PresentResult};
use slotmap::SlotMap;

use crate::arena::{GpuArena, GpuHandle, GpuObject};
use crate::backend::{BindGroupDesc, BindGroupKey, InstancedDraw, PipelineDesc, PipelineKey, RenderBackend};
use crate::frame::FrameLabel;

/// A draw as the headless backend received it, for assertions.
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub slot: FrameLabel,
    pub pipeline: PipelineKey,
    pub bind_group: BindGroupKey,
    pub vertex_buffer: GpuHandle,
    pub instance_buffer: GpuHandle,
    pub index_buffer: GpuHandle,
    pub index_count: u32,
    pub instance_count: u32,
}

/// Buffers and textures are plain byte vectors here.
struct HostObject {
    bytes: Vec<u8>,
}

impl GpuObject for HostObject {
    fn release(&mut self) {
        self.bytes = Vec::new();
    }
}

/// Device-free stand-in that keeps the backend contract observable: every
/// buffer is a byte vector, every draw lands in a log, and surface staleness
/// is injected by the test instead of a window system.
pub struct HeadlessBackend {
    frames_in_flight: usize,
    arena: GpuArena<HostObject>,
    pipelines: SlotMap<PipelineKey, PipelineDesc>,
    bind_groups: SlotMap<BindGroupKey, BindGroupDesc>,

    swapchain_extent: vk::Extent2D,
    drawable: vk::Extent2D,
    /// Applied one entry per `pump_events` call, simulating resize events.
    drawable_script: VecDeque<vk::Extent2D>,
    stale_acquires: u32,
    stale_presents: u32,

    image_cursor: u32,
    recording: Option<(FrameLabel, u32)>,

    draws: Vec<DrawRecord>,
    pump_count: u32,
    recreate_count: u32,
}

impl HeadlessBackend {
    const IMAGE_COUNT: u32 = 3;

    pub fn new(frames_in_flight: usize, extent: vk::Extent2D) -> Self {
        assert!(frames_in_flight >= 1);
        Self {
            frames_in_flight,
            arena: GpuArena::new(),
            pipelines: SlotMap::with_key(),
            bind_groups: SlotMap::with_key(),
            swapchain_extent: extent,
            drawable: extent,
            drawable_script: VecDeque::new(),
            stale_acquires: 0,
            stale_presents: 0,
            image_cursor: 0,
            recording: None,
            draws: Vec::new(),
            pump_count: 0,
            recreate_count: 0,
        }
    }

    // test scripting
    pub fn inject_stale_acquires(&mut self, count: u32) {
        self.stale_acquires += count;
    }

    pub fn inject_stale_presents(&mut self, count: u32) {
        self.stale_presents += count;
    }

    pub fn set_drawable_extent(&mut self, extent: vk::Extent2D) {
        self.drawable = extent;
    }

    /// Queue extents that `pump_events` will apply one per call.
    pub fn script_drawable_extents(&mut self, extents: impl IntoIterator<Item = vk::Extent2D>) {
        self.drawable_script.extend(extents);
    }

    // observations
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn clear_draws(&mut self) {
        self.draws.clear();
    }

    pub fn pump_count(&self) -> u32 {
        self.pump_count
    }

    pub fn recreate_count(&self) -> u32 {
        self.recreate_count
    }

    pub fn bind_group_desc(&self, key: BindGroupKey) -> &BindGroupDesc {
        &self.bind_groups[key]
    }
}

impl RenderBackend for HeadlessBackend {
    fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    fn wait_slot(&mut self, _slot: FrameLabel) -> GfxResult<()> {
        Ok(())
    }

    fn acquire_image(&mut self, _slot: FrameLabel) -> GfxResult<AcquireResult> {
        if self.stale_acquires > 0 {
            self.stale_acquires -= 1;
            return Ok(AcquireResult::OutOfDate);
        }
        let image_index = self.image_cursor;
        self.image_cursor = (self.image_cursor + 1) % Self::IMAGE_COUNT;
        Ok(AcquireResult::Acquired { image_index, suboptimal: false })
    }

    fn begin_recording(
        &mut self,
        slot: FrameLabel,
        image_index: u32,
        _clear_color: [f32; 4],
    ) -> GfxResult<()> {
        assert!(self.recording.is_none(), "recording twice without a submit");
        self.recording = Some((slot, image_index));
        Ok(())
    }

    fn submit(&mut self, slot: FrameLabel, image_index: u32) -> GfxResult<()> {
        assert_eq!(self.recording.take(), Some((slot, image_index)), "submit without matching begin");
        Ok(())
    }

    fn present(&mut self, _slot: FrameLabel, _image_index: u32) -> GfxResult<PresentResult> {
        if self.stale_presents > 0 {
            self.stale_presents -= 1;
            return Ok(PresentResult::Stale);
        }
        Ok(PresentResult::Presented)
    }

    fn wait_idle(&mut self) {}

    fn drawable_extent(&self) -> vk::Extent2D {
        self.drawable
    }

    fn pump_events(&mut self) {
        self.pump_count += 1;
        if let Some(extent) = self.drawable_script.pop_front() {
            self.drawable = extent;
        }
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> GfxResult<()> {
        assert!(extent.width > 0 && extent.height > 0, "recreate with zero extent");
        self.recreate_count += 1;
        self.swapchain_extent = extent;
        self.image_cursor = 0;
        Ok(())
    }

    fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }

    fn create_vertex_buffer(&mut self, data: &[u8], _debug_name: &str) -> GfxResult<GpuHandle> {
        Ok(self.arena.insert(HostObject { bytes: data.to_vec() }))
    }

    fn create_index_buffer(&mut self, data: &[u8], _debug_name: &str) -> GfxResult<GpuHandle> {
        Ok(self.arena.insert(HostObject { bytes: data.to_vec() }))
    }

    fn create_instance_buffer(&mut self, size: u64, _debug_name: &str) -> GfxResult<GpuHandle> {
        Ok(self.arena.insert(HostObject { bytes: vec![0; size as usize] }))
    }

    fn create_uniform_buffer(&mut self, size: u64, _debug_name: &str) -> GfxResult<GpuHandle> {
        Ok(self.arena.insert(HostObject { bytes: vec![0; size as usize] }))
    }

    fn create_texture(
        &mut self,
        _extent: vk::Extent2D,
        rgba8_pixels: &[u8],
        _debug_name: &str,
    ) -> GfxResult<GpuHandle> {
        Ok(self.arena.insert(HostObject { bytes: rgba8_pixels.to_vec() }))
    }

    fn write_buffer(&mut self, handle: GpuHandle, offset: usize, bytes: &[u8]) -> GfxResult<()> {
        let object = self.arena.get_mut(handle).expect("buffer handle is not live");
        object.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn buffer_bytes(&self, handle: GpuHandle) -> Vec<u8> {
        self.arena.get(handle).expect("buffer handle is not live").bytes.clone()
    }

    fn destroy_object(&mut self, handle: GpuHandle) -> bool {
        self.arena.destroy(handle)
    }

    fn is_valid_object(&self, handle: GpuHandle) -> bool {
        self.arena.is_valid(handle)
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc, _debug_name: &str) -> GfxResult<PipelineKey> {
        Ok(self.pipelines.insert(desc.clone()))
    }

    fn create_bind_group(&mut self, desc: &BindGroupDesc, _debug_name: &str) -> GfxResult<BindGroupKey> {
        Ok(self.bind_groups.insert(desc.clone()))
    }

    fn destroy_bind_group(&mut self, key: BindGroupKey) {
        self.bind_groups.remove(key);
    }

    fn draw_instanced(&mut self, slot: FrameLabel, draw: &InstancedDraw) {
        let (recording_slot, _) = self.recording.expect("draw outside begin/submit");
        assert_eq!(recording_slot, slot, "draw recorded against the wrong slot");
        self.draws.push(DrawRecord {
            slot,
            pipeline: draw.pipeline,
            bind_group: draw.bind_group,
            vertex_buffer: draw.vertex_buffer,
            instance_buffer: draw.instance_buffer,
            index_buffer: draw.index_buffer,
            index_count: draw.index_count,
            instance_count: draw.instance_count,
        });
    }
}
