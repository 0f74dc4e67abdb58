use std::rc::Rc;

use ash::vk;
use vk_mem::Alloc;

use crate::buffer::GfxBuffer;
use crate::command::one_time_submit;
use crate::error::GfxResult;
use crate::gfx::{Gfx, GfxAllocator};

/// vma-allocated 2d image with its view. Swapchain images are not represented
/// here; their memory belongs to the presentation engine.
pub struct GfxImage2D {
    handle: vk::Image,
    view: vk::ImageView,
    allocation: Option<vk_mem::Allocation>,

    extent: vk::Extent2D,
    format: vk::Format,

    allocator: Rc<GfxAllocator>,
}

// new & init
impl GfxImage2D {
    pub fn new(
        allocator: Rc<GfxAllocator>,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };

        let (handle, allocation) = unsafe { allocator.create_image(&image_ci, &alloc_ci)? };
        let device = allocator.device().clone();
        device.set_debug_name(handle, debug_name);

        let view_ci = vk::ImageViewCreateInfo::default()
            .image(handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .level_count(1)
                    .layer_count(1),
            );
        let view = unsafe { device.create_image_view(&view_ci, None)? };
        device.set_debug_name(view, &format!("{debug_name}-view"));

        Ok(Self {
            handle,
            view,
            allocation: Some(allocation),
            extent,
            format,
            allocator,
        })
    }

    pub fn new_depth(
        allocator: Rc<GfxAllocator>,
        extent: vk::Extent2D,
        debug_name: &str,
    ) -> GfxResult<Self> {
        Self::new(
            allocator,
            extent,
            vk::Format::D32_SFLOAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
            debug_name,
        )
    }
}

// getter
impl GfxImage2D {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

// destroy
impl GfxImage2D {
    pub fn destroy(&mut self) {
        let Some(mut allocation) = self.allocation.take() else {
            return;
        };
        let device = self.allocator.device().clone();
        unsafe {
            device.destroy_image_view(self.view, None);
            self.allocator.destroy_image(self.handle, &mut allocation);
        }
        self.view = vk::ImageView::null();
        self.handle = vk::Image::null();
    }
}

impl Drop for GfxImage2D {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Sampled texture: image, view and sampler, filled once from RGBA8 pixels.
pub struct GfxTexture {
    image: GfxImage2D,
    sampler: vk::Sampler,
}

// new & init
impl GfxTexture {
    pub fn from_rgba8(
        gfx: &Gfx,
        extent: vk::Extent2D,
        pixels: &[u8],
        debug_name: &str,
    ) -> GfxResult<Self> {
        assert_eq!(pixels.len(), extent.width as usize * extent.height as usize * 4);

        let image = GfxImage2D::new(
            gfx.allocator.clone(),
            extent,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
            debug_name,
        )?;

        let mut stage = GfxBuffer::new_host_visible(
            gfx.allocator.clone(),
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            &format!("{debug_name}-stage"),
        )?;
        stage.write(0, pixels)?;

        one_time_submit(&gfx.device, gfx.graphics_queue(), debug_name, |cmd| {
            cmd.image_barriers(&[Self::transition(
                image.handle(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::PipelineStageFlags2::NONE,
                vk::AccessFlags2::NONE,
                vk::PipelineStageFlags2::COPY,
                vk::AccessFlags2::TRANSFER_WRITE,
            )]);
            cmd.copy_buffer_to_image(stage.handle(), image.handle(), extent);
            cmd.image_barriers(&[Self::transition(
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::PipelineStageFlags2::COPY,
                vk::AccessFlags2::TRANSFER_WRITE,
                vk::PipelineStageFlags2::FRAGMENT_SHADER,
                vk::AccessFlags2::SHADER_SAMPLED_READ,
            )]);
        })?;
        stage.destroy();

        let sampler_ci = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .max_lod(vk::LOD_CLAMP_NONE);
        let sampler = unsafe { gfx.device.create_sampler(&sampler_ci, None)? };
        gfx.device.set_debug_name(sampler, &format!("{debug_name}-sampler"));

        Ok(Self { image, sampler })
    }

    fn transition(
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_stage: vk::PipelineStageFlags2,
        src_access: vk::AccessFlags2,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .image(image)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_stage_mask(src_stage)
            .src_access_mask(src_access)
            .dst_stage_mask(dst_stage)
            .dst_access_mask(dst_access)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            )
    }
}

// getter
impl GfxTexture {
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }
}

// destroy
impl GfxTexture {
    pub fn destroy(&mut self) {
        if self.sampler != vk::Sampler::null() {
            unsafe {
                self.image
                    .allocator
                    .device()
                    .destroy_sampler(self.sampler, None)
            };
            self.sampler = vk::Sampler::null();
        }
        self.image.destroy();
    }
}

impl Drop for GfxTexture {
    fn drop(&mut self) {
        self.destroy();
    }
}
