use std::rc::Rc;

use ash::vk;

use crate::error::GfxResult;
use crate::gfx::GfxDevice;

pub struct GfxCommandPool {
    handle: vk::CommandPool,
    device: Rc<GfxDevice>,
}

// new & destroy
impl GfxCommandPool {
    pub fn new(
        device: Rc<GfxDevice>,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let ci = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);
        let handle = unsafe { device.create_command_pool(&ci, None)? };
        device.set_debug_name(handle, debug_name);
        Ok(Self { handle, device })
    }

    pub fn destroy(&mut self) {
        if self.handle == vk::CommandPool::null() {
            return;
        }
        unsafe { self.device.destroy_command_pool(self.handle, None) };
        self.handle = vk::CommandPool::null();
    }
}

impl GfxCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    pub fn alloc_command_buffer(&self, debug_name: &str) -> GfxResult<GfxCommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let handle = unsafe { self.device.allocate_command_buffers(&alloc_info)?[0] };
        self.device.set_debug_name(handle, debug_name);
        Ok(GfxCommandBuffer {
            handle,
            device: self.device.clone(),
        })
    }
}

impl Drop for GfxCommandPool {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Thin recording wrapper. The buffer is freed with its pool; no teardown of
/// its own.
#[derive(Clone)]
pub struct GfxCommandBuffer {
    handle: vk::CommandBuffer,
    device: Rc<GfxDevice>,
}

// recording phases
impl GfxCommandBuffer {
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    pub fn reset(&self) -> GfxResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.handle, vk::CommandBufferResetFlags::empty())?;
        }
        Ok(())
    }

    pub fn begin(&self, usage: vk::CommandBufferUsageFlags) -> GfxResult<()> {
        let info = vk::CommandBufferBeginInfo::default().flags(usage);
        unsafe { self.device.begin_command_buffer(self.handle, &info)? };
        Ok(())
    }

    pub fn end(&self) -> GfxResult<()> {
        unsafe { self.device.end_command_buffer(self.handle)? };
        Ok(())
    }
}

// recorded commands
impl GfxCommandBuffer {
    pub fn begin_rendering(&self, rendering_info: &vk::RenderingInfo) {
        unsafe { self.device.cmd_begin_rendering(self.handle, rendering_info) };
    }

    pub fn end_rendering(&self) {
        unsafe { self.device.cmd_end_rendering(self.handle) };
    }

    pub fn image_barriers(&self, barriers: &[vk::ImageMemoryBarrier2]) {
        let dep = vk::DependencyInfo::default().image_memory_barriers(barriers);
        unsafe { self.device.cmd_pipeline_barrier2(self.handle, &dep) };
    }

    pub fn set_viewport_scissor(&self, extent: vk::Extent2D) {
        let viewport = vk::Viewport::default()
            .width(extent.width as f32)
            .height(extent.height as f32)
            .max_depth(1.0);
        let scissor = vk::Rect2D::default().extent(extent);
        unsafe {
            self.device
                .cmd_set_viewport(self.handle, 0, std::slice::from_ref(&viewport));
            self.device
                .cmd_set_scissor(self.handle, 0, std::slice::from_ref(&scissor));
        }
    }

    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.handle, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    pub fn bind_descriptor_set(&self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.handle,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                std::slice::from_ref(&set),
                &[],
            )
        };
    }

    pub fn bind_vertex_buffers(&self, first_binding: u32, buffers: &[vk::Buffer]) {
        let offsets = vec![0; buffers.len()];
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.handle, first_binding, buffers, &offsets)
        };
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.handle, buffer, 0, vk::IndexType::UINT32)
        };
    }

    pub fn draw_indexed(&self, index_count: u32, instance_count: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed(self.handle, index_count, instance_count, 0, 0, 0)
        };
    }

    /// Copy a tightly packed pixel buffer into mip 0 of a 2d image. The image
    /// must already be in TRANSFER_DST_OPTIMAL.
    pub fn copy_buffer_to_image(&self, src: vk::Buffer, dst: vk::Image, extent: vk::Extent2D) {
        let region = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .layer_count(1),
            )
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.handle,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&region),
            )
        };
    }

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy::default().size(size);
        unsafe {
            self.device
                .cmd_copy_buffer(self.handle, src, dst, std::slice::from_ref(&region))
        };
    }
}

/// Record and submit a transient command buffer, then block until the queue
/// drains. Used for setup-time staging copies and layout transitions only.
pub fn one_time_submit<F>(
    device: &Rc<GfxDevice>,
    queue: vk::Queue,
    debug_name: &str,
    record: F,
) -> GfxResult<()>
where
    F: FnOnce(&GfxCommandBuffer),
{
    let mut pool = GfxCommandPool::new(
        device.clone(),
        device.graphics_queue_family(),
        vk::CommandPoolCreateFlags::TRANSIENT,
        &format!("{debug_name}-pool"),
    )?;
    let cmd = pool.alloc_command_buffer(debug_name)?;

    cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
    record(&cmd);
    cmd.end()?;

    let cmd_handle = cmd.handle();
    let submit = vk::SubmitInfo::default().command_buffers(std::slice::from_ref(&cmd_handle));
    unsafe {
        device.queue_submit(queue, std::slice::from_ref(&submit), vk::Fence::null())?;
        device.queue_wait_idle(queue)?;
    }
    pool.destroy();
    Ok(())
}
