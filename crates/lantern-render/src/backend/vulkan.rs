use std::ffi::CString;
use std::rc::Rc;

use ash::vk;
use lantern_gfx::{
    create_set_layout, update_descriptor_set, vec4_attributes, vertex_binding, AcquireResult,
    DescriptorWrite, Gfx, GfxBuffer, GfxCommandBuffer, GfxCommandPool, GfxDescriptorPool, GfxFence,
    GfxGraphicsPipeline, GfxImage2D, GfxResult, GfxSemaphore, GfxSurface, GfxSwapchain,
    GfxTexture, GraphicsPipelineDesc, PresentResult,
};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use slotmap::SlotMap;

use crate::arena::{GpuArena, GpuHandle, GpuObject};
use crate::backend::{BindGroupDesc, BindGroupKey, InstancedDraw, PipelineDesc, PipelineKey, RenderBackend};
use crate::frame::FrameLabel;
use crate::uniforms::{InstanceRecord, Vertex};

/// What the windowing layer must provide. The renderer never talks to a
/// window type directly; it sees raw surface handles plus two callbacks.
pub struct WindowBridge {
    pub display_handle: RawDisplayHandle,
    pub window_handle: RawWindowHandle,
    /// Current drawable size in pixels. Zero while minimized.
    pub drawable_extent: Box<dyn Fn() -> vk::Extent2D>,
    /// Poll the event queue once without blocking.
    pub pump_events: Box<dyn FnMut()>,
}

/// Every GPU object the arena tracks for this backend. Tagged so teardown
/// dispatches to the right destroy path without trait objects.
enum RenderResource {
    Buffer(GfxBuffer),
    Image(GfxImage2D),
    Texture(GfxTexture),
    Swapchain(GfxSwapchain),
}

impl GpuObject for RenderResource {
    fn release(&mut self) {
        match self {
            RenderResource::Buffer(buffer) => buffer.destroy(),
            RenderResource::Image(image) => image.destroy(),
            RenderResource::Texture(texture) => texture.destroy(),
            RenderResource::Swapchain(swapchain) => swapchain.destroy(),
        }
    }
}

/// Per-slot synchronization set: one fence, two semaphores, one command
/// buffer. Slots never share any of these.
struct FrameSync {
    fence: GfxFence,
    image_available: GfxSemaphore,
    render_finished: GfxSemaphore,
    cmd: GfxCommandBuffer,
}

pub struct VulkanBackend {
    // arena before gfx: tracked resources must die before the allocator
    arena: GpuArena<RenderResource>,
    swapchain: GpuHandle,
    depth: GpuHandle,
    default_base_color: GpuHandle,
    default_normal: GpuHandle,

    frames: Vec<FrameSync>,
    command_pool: GfxCommandPool,

    descriptor_pool: GfxDescriptorPool,
    set_layout: vk::DescriptorSetLayout,
    pipelines: SlotMap<PipelineKey, GfxGraphicsPipeline>,
    bind_groups: SlotMap<BindGroupKey, vk::DescriptorSet>,

    window: WindowBridge,
    surface: GfxSurface,
    gfx: Gfx,
}

// new & init
impl VulkanBackend {
    pub fn new(app_name: &str, window: WindowBridge, frames_in_flight: usize) -> GfxResult<Self> {
        let app_name = CString::new(app_name).unwrap_or_default();
        let gfx = Gfx::new(&app_name, Some(window.display_handle))?;
        let surface = GfxSurface::new(&gfx, window.display_handle, window.window_handle)?;

        let mut arena = GpuArena::new();
        let extent = (window.drawable_extent)();
        let swapchain_obj = GfxSwapchain::new(&gfx, &surface, extent, "main-swapchain")?;
        let depth_obj = GfxImage2D::new_depth(gfx.allocator.clone(), swapchain_obj.extent(), "main-depth")?;
        let swapchain = arena.insert(RenderResource::Swapchain(swapchain_obj));
        let depth = arena.insert(RenderResource::Image(depth_obj));

        let command_pool = GfxCommandPool::new(
            gfx.device.clone(),
            gfx.device.graphics_queue_family(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "frame-command-pool",
        )?;
        let frames = (0..frames_in_flight)
            .map(|slot| {
                let label = FrameLabel(slot);
                Ok(FrameSync {
                    // pre-signaled: the first wait on a fresh slot returns at once
                    fence: GfxFence::new(gfx.device.clone(), true, &format!("frame-fence-{label}"))?,
                    image_available: GfxSemaphore::new(
                        gfx.device.clone(),
                        &format!("image-available-{label}"),
                    )?,
                    render_finished: GfxSemaphore::new(
                        gfx.device.clone(),
                        &format!("render-finished-{label}"),
                    )?,
                    cmd: command_pool.alloc_command_buffer(&format!("frame-cmd-{label}"))?,
                })
            })
            .collect::<GfxResult<Vec<_>>>()?;

        let descriptor_pool = GfxDescriptorPool::new(gfx.device.clone(), "main-descriptor-pool")?;
        let set_layout = create_set_layout(
            &gfx.device,
            &[
                (0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT),
                (1, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::FRAGMENT),
                (2, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::FRAGMENT),
                (3, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::FRAGMENT),
                (4, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
                (5, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
            ],
            "group-set-layout",
        )?;

        // fallbacks bound when a material carries no map
        let white = GfxTexture::from_rgba8(
            &gfx,
            vk::Extent2D { width: 1, height: 1 },
            &[255, 255, 255, 255],
            "default-base-color",
        )?;
        let flat = GfxTexture::from_rgba8(
            &gfx,
            vk::Extent2D { width: 1, height: 1 },
            &[128, 128, 255, 255],
            "default-normal",
        )?;
        let default_base_color = arena.insert(RenderResource::Texture(white));
        let default_normal = arena.insert(RenderResource::Texture(flat));

        Ok(Self {
            arena,
            swapchain,
            depth,
            default_base_color,
            default_normal,
            frames,
            command_pool,
            descriptor_pool,
            set_layout,
            pipelines: SlotMap::with_key(),
            bind_groups: SlotMap::with_key(),
            window,
            surface,
            gfx,
        })
    }
}

// tools
impl VulkanBackend {
    fn swapchain_ref(&self) -> &GfxSwapchain {
        match self.arena.get(self.swapchain) {
            Some(RenderResource::Swapchain(swapchain)) => swapchain,
            _ => panic!("swapchain handle is not live"),
        }
    }

    fn depth_ref(&self) -> &GfxImage2D {
        match self.arena.get(self.depth) {
            Some(RenderResource::Image(image)) => image,
            _ => panic!("depth handle is not live"),
        }
    }

    fn buffer_ref(&self, handle: GpuHandle) -> &GfxBuffer {
        match self.arena.get(handle) {
            Some(RenderResource::Buffer(buffer)) => buffer,
            _ => panic!("buffer handle is not live"),
        }
    }

    fn texture_view_sampler(&self, handle: GpuHandle) -> (vk::ImageView, vk::Sampler) {
        match self.arena.get(handle) {
            Some(RenderResource::Texture(texture)) => (texture.view(), texture.sampler()),
            _ => panic!("texture handle is not live"),
        }
    }

    fn insert_buffer(&mut self, buffer: GfxBuffer) -> GpuHandle {
        self.arena.insert(RenderResource::Buffer(buffer))
    }

    fn image_barrier(
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src: (vk::PipelineStageFlags2, vk::AccessFlags2),
        dst: (vk::PipelineStageFlags2, vk::AccessFlags2),
    ) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .image(image)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_stage_mask(src.0)
            .src_access_mask(src.1)
            .dst_stage_mask(dst.0)
            .dst_access_mask(dst.1)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .level_count(1)
                    .layer_count(1),
            )
    }
}

impl RenderBackend for VulkanBackend {
    fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    fn wait_slot(&mut self, slot: FrameLabel) -> GfxResult<()> {
        self.frames[slot.index()].fence.wait()
    }

    fn acquire_image(&mut self, slot: FrameLabel) -> GfxResult<AcquireResult> {
        let semaphore = self.frames[slot.index()].image_available.handle();
        self.swapchain_ref().acquire(semaphore)
    }

    fn begin_recording(
        &mut self,
        slot: FrameLabel,
        image_index: u32,
        clear_color: [f32; 4],
    ) -> GfxResult<()> {
        let frame = &self.frames[slot.index()];
        // only reset once we know this slot's image is coming; a stale
        // acquire must leave the fence signaled for the retry
        frame.fence.reset()?;

        let cmd = frame.cmd.clone();
        cmd.reset()?;
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

        let swapchain = self.swapchain_ref();
        let extent = swapchain.extent();
        let color_image = swapchain.image(image_index);
        let color_view = swapchain.view(image_index);
        let depth = self.depth_ref();
        let depth_image = depth.handle();
        let depth_view = depth.view();

        cmd.image_barriers(&[
            Self::image_barrier(
                color_image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                (vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE),
                (
                    vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                    vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                ),
            ),
            Self::image_barrier(
                depth_image,
                vk::ImageAspectFlags::DEPTH,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
                (vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE),
                (
                    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS,
                    vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
                ),
            ),
        ]);

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(color_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue { float32: clear_color },
            });
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(depth_view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            });
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D::default().extent(extent))
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment))
            .depth_attachment(&depth_attachment);

        cmd.begin_rendering(&rendering_info);
        cmd.set_viewport_scissor(extent);
        Ok(())
    }

    fn submit(&mut self, slot: FrameLabel, image_index: u32) -> GfxResult<()> {
        let frame = &self.frames[slot.index()];
        let cmd = frame.cmd.clone();

        cmd.end_rendering();
        cmd.image_barriers(&[Self::image_barrier(
            self.swapchain_ref().image(image_index),
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            (
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            ),
            (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE),
        )]);
        cmd.end()?;

        let wait_info = vk::SemaphoreSubmitInfo::default()
            .semaphore(frame.image_available.handle())
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        let signal_info = vk::SemaphoreSubmitInfo::default()
            .semaphore(frame.render_finished.handle())
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS);
        let cmd_info = vk::CommandBufferSubmitInfo::default().command_buffer(cmd.handle());
        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(std::slice::from_ref(&wait_info))
            .command_buffer_infos(std::slice::from_ref(&cmd_info))
            .signal_semaphore_infos(std::slice::from_ref(&signal_info));
        unsafe {
            self.gfx.device.queue_submit2(
                self.gfx.graphics_queue(),
                std::slice::from_ref(&submit),
                frame.fence.handle(),
            )?;
        }
        Ok(())
    }

    fn present(&mut self, slot: FrameLabel, image_index: u32) -> GfxResult<PresentResult> {
        let semaphore = self.frames[slot.index()].render_finished.handle();
        self.swapchain_ref()
            .present(self.gfx.graphics_queue(), image_index, semaphore)
    }

    fn wait_idle(&mut self) {
        self.gfx.device.wait_idle();
    }

    fn drawable_extent(&self) -> vk::Extent2D {
        (self.window.drawable_extent)()
    }

    fn pump_events(&mut self) {
        (self.window.pump_events)();
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> GfxResult<()> {
        // nothing may be in flight while swapchain-dependent objects die
        self.gfx.device.wait_idle();
        self.arena.destroy(self.depth);
        self.arena.destroy(self.swapchain);

        let swapchain_obj = GfxSwapchain::new(&self.gfx, &self.surface, extent, "main-swapchain")?;
        let depth_obj = GfxImage2D::new_depth(
            self.gfx.allocator.clone(),
            swapchain_obj.extent(),
            "main-depth",
        )?;
        self.swapchain = self.arena.insert(RenderResource::Swapchain(swapchain_obj));
        self.depth = self.arena.insert(RenderResource::Image(depth_obj));
        Ok(())
    }

    fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain_ref().extent()
    }

    fn create_vertex_buffer(&mut self, data: &[u8], debug_name: &str) -> GfxResult<GpuHandle> {
        let buffer = GfxBuffer::new_vertex_buffer(&self.gfx, data, debug_name)?;
        Ok(self.insert_buffer(buffer))
    }

    fn create_index_buffer(&mut self, data: &[u8], debug_name: &str) -> GfxResult<GpuHandle> {
        let buffer = GfxBuffer::new_index_buffer(&self.gfx, data, debug_name)?;
        Ok(self.insert_buffer(buffer))
    }

    fn create_instance_buffer(&mut self, size: u64, debug_name: &str) -> GfxResult<GpuHandle> {
        let buffer = GfxBuffer::new_instance_buffer(self.gfx.allocator.clone(), size, debug_name)?;
        Ok(self.insert_buffer(buffer))
    }

    fn create_uniform_buffer(&mut self, size: u64, debug_name: &str) -> GfxResult<GpuHandle> {
        let buffer = GfxBuffer::new_uniform_buffer(self.gfx.allocator.clone(), size, debug_name)?;
        Ok(self.insert_buffer(buffer))
    }

    fn create_texture(
        &mut self,
        extent: vk::Extent2D,
        rgba8_pixels: &[u8],
        debug_name: &str,
    ) -> GfxResult<GpuHandle> {
        let texture = GfxTexture::from_rgba8(&self.gfx, extent, rgba8_pixels, debug_name)?;
        Ok(self.arena.insert(RenderResource::Texture(texture)))
    }

    fn write_buffer(&mut self, handle: GpuHandle, offset: usize, bytes: &[u8]) -> GfxResult<()> {
        match self.arena.get_mut(handle) {
            Some(RenderResource::Buffer(buffer)) => buffer.write(offset, bytes),
            _ => panic!("buffer handle is not live"),
        }
    }

    fn buffer_bytes(&self, handle: GpuHandle) -> Vec<u8> {
        self.buffer_ref(handle).mapped_slice().to_vec()
    }

    fn destroy_object(&mut self, handle: GpuHandle) -> bool {
        self.arena.destroy(handle)
    }

    fn is_valid_object(&self, handle: GpuHandle) -> bool {
        self.arena.is_valid(handle)
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc, debug_name: &str) -> GfxResult<PipelineKey> {
        let mut attributes = vec![
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ];
        // three mat4s as twelve vec4 attributes
        attributes.extend(vec4_attributes(1, 3, 12));

        let pipeline_desc = GraphicsPipelineDesc {
            vertex_shader: desc.vertex_shader.clone(),
            fragment_shader: desc.fragment_shader.clone(),
            vertex_bindings: vec![
                vertex_binding(0, std::mem::size_of::<Vertex>() as u32, vk::VertexInputRate::VERTEX),
                vertex_binding(
                    1,
                    std::mem::size_of::<InstanceRecord>() as u32,
                    vk::VertexInputRate::INSTANCE,
                ),
            ],
            vertex_attributes: attributes,
            set_layouts: vec![self.set_layout],
            color_format: self.swapchain_ref().format(),
            depth_format: vk::Format::D32_SFLOAT,
        };
        let pipeline = GfxGraphicsPipeline::new(Rc::clone(&self.gfx.device), &pipeline_desc, debug_name)?;
        Ok(self.pipelines.insert(pipeline))
    }

    fn create_bind_group(&mut self, desc: &BindGroupDesc, debug_name: &str) -> GfxResult<BindGroupKey> {
        let set = self.descriptor_pool.alloc_set(self.set_layout, debug_name)?;

        let uniform = |handle: GpuHandle, binding: u32| {
            let buffer = self.buffer_ref(handle);
            DescriptorWrite::UniformBuffer {
                binding,
                buffer: buffer.handle(),
                range: buffer.size(),
            }
        };
        let sampled = |handle: Option<GpuHandle>, fallback: GpuHandle, binding: u32| {
            let (view, sampler) = self.texture_view_sampler(handle.unwrap_or(fallback));
            DescriptorWrite::CombinedImageSampler { binding, view, sampler }
        };

        let writes = [
            uniform(desc.transform, 0),
            uniform(desc.lighting, 1),
            uniform(desc.material, 2),
            uniform(desc.toggles, 3),
            sampled(desc.base_color_map, self.default_base_color, 4),
            sampled(desc.normal_map, self.default_normal, 5),
        ];
        update_descriptor_set(&self.gfx.device, set, &writes);
        Ok(self.bind_groups.insert(set))
    }

    fn destroy_bind_group(&mut self, key: BindGroupKey) {
        if let Some(set) = self.bind_groups.remove(key) {
            if let Err(err) = self.descriptor_pool.free_set(set) {
                log::warn!("failed to free descriptor set: {err}");
            }
        }
    }

    fn draw_instanced(&mut self, slot: FrameLabel, draw: &InstancedDraw) {
        let cmd = self.frames[slot.index()].cmd.clone();
        let pipeline = &self.pipelines[draw.pipeline];
        cmd.bind_graphics_pipeline(pipeline.handle());
        cmd.bind_descriptor_set(pipeline.layout(), self.bind_groups[draw.bind_group]);
        cmd.bind_vertex_buffers(
            0,
            &[
                self.buffer_ref(draw.vertex_buffer).handle(),
                self.buffer_ref(draw.instance_buffer).handle(),
            ],
        );
        cmd.bind_index_buffer(self.buffer_ref(draw.index_buffer).handle());
        cmd.draw_indexed(draw.index_count, draw.instance_count);
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        self.gfx.device.wait_idle();
        for (_, set) in self.bind_groups.drain() {
            let _ = self.descriptor_pool.free_set(set);
        }
        for (_, mut pipeline) in self.pipelines.drain() {
            pipeline.destroy();
        }
        unsafe {
            self.gfx.device.destroy_descriptor_set_layout(self.set_layout, None);
        }
        self.descriptor_pool.destroy();
        self.arena.destroy_all();
        self.frames.clear();
        self.command_pool.destroy();
        self.surface.destroy();
    }
}
