use std::rc::Rc;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::error::{GfxError, GfxResult};
use crate::gfx::{Gfx, GfxDevice};

/// Acquire told us whether the image is usable and whether the swapchain
/// should be rebuilt. Staleness is data, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    Acquired { image_index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentResult {
    Presented,
    Stale,
}

pub struct GfxSurface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

// new & init
impl GfxSurface {
    pub fn new(
        gfx: &Gfx,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> GfxResult<Self> {
        let loader = ash::khr::surface::Instance::new(gfx.entry(), gfx.instance());
        let handle = unsafe {
            ash_window::create_surface(gfx.entry(), gfx.instance(), display_handle, window_handle, None)?
        };
        Ok(Self { handle, loader })
    }
}

// tools
impl GfxSurface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    pub fn capabilities(&self, pdevice: vk::PhysicalDevice) -> GfxResult<vk::SurfaceCapabilitiesKHR> {
        Ok(unsafe {
            self.loader
                .get_physical_device_surface_capabilities(pdevice, self.handle)?
        })
    }

    pub fn formats(&self, pdevice: vk::PhysicalDevice) -> GfxResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(unsafe {
            self.loader
                .get_physical_device_surface_formats(pdevice, self.handle)?
        })
    }

    pub fn present_modes(&self, pdevice: vk::PhysicalDevice) -> GfxResult<Vec<vk::PresentModeKHR>> {
        Ok(unsafe {
            self.loader
                .get_physical_device_surface_present_modes(pdevice, self.handle)?
        })
    }

    pub fn supports_queue_family(
        &self,
        pdevice: vk::PhysicalDevice,
        queue_family: u32,
    ) -> GfxResult<bool> {
        Ok(unsafe {
            self.loader
                .get_physical_device_surface_support(pdevice, queue_family, self.handle)?
        })
    }

    pub fn destroy(&mut self) {
        if self.handle == vk::SurfaceKHR::null() {
            return;
        }
        unsafe { self.loader.destroy_surface(self.handle, None) };
        self.handle = vk::SurfaceKHR::null();
    }
}

impl Drop for GfxSurface {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// The presentable image chain plus its views. Rebuilt whenever acquire or
/// present reports staleness or the window is resized.
pub struct GfxSwapchain {
    loader: ash::khr::swapchain::Device,
    handle: vk::SwapchainKHR,

    surface_format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,

    device: Rc<GfxDevice>,
}

// new & init
impl GfxSwapchain {
    pub fn new(
        gfx: &Gfx,
        surface: &GfxSurface,
        desired_extent: vk::Extent2D,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let pdevice = gfx.physical_device();
        if !surface.supports_queue_family(pdevice, gfx.device.graphics_queue_family())? {
            return Err(GfxError::SurfaceUnsupported);
        }

        let caps = surface.capabilities(pdevice)?;
        let formats = surface.formats(pdevice)?;
        let modes = surface.present_modes(pdevice)?;
        if formats.is_empty() || modes.is_empty() {
            return Err(GfxError::SurfaceUnsupported);
        }

        let surface_format = pick_surface_format(&formats);
        let present_mode = pick_present_mode(&modes);
        let extent = clamp_extent(desired_extent, &caps);
        let image_count = pick_image_count(&caps);

        let ci = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let loader = ash::khr::swapchain::Device::new(gfx.instance(), &gfx.device);
        let handle = unsafe { loader.create_swapchain(&ci, None)? };
        gfx.device.set_debug_name(handle, debug_name);

        let images = unsafe { loader.get_swapchain_images(handle)? };
        let views = images
            .iter()
            .enumerate()
            .map(|(i, image)| {
                gfx.device.set_debug_name(*image, &format!("{debug_name}-image-{i}"));
                let view_ci = vk::ImageViewCreateInfo::default()
                    .image(*image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .level_count(1)
                            .layer_count(1),
                    );
                let view = unsafe { gfx.device.create_image_view(&view_ci, None)? };
                gfx.device.set_debug_name(view, &format!("{debug_name}-view-{i}"));
                Ok(view)
            })
            .collect::<GfxResult<Vec<_>>>()?;

        log::info!(
            "swapchain ready: {}x{}, {} images, {:?}/{:?}",
            extent.width,
            extent.height,
            images.len(),
            surface_format.format,
            present_mode,
        );

        Ok(Self {
            loader,
            handle,
            surface_format,
            extent,
            images,
            views,
            device: gfx.device.clone(),
        })
    }
}

// getter
impl GfxSwapchain {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn image(&self, index: u32) -> vk::Image {
        self.images[index as usize]
    }

    #[inline]
    pub fn view(&self, index: u32) -> vk::ImageView {
        self.views[index as usize]
    }
}

// acquire & present
impl GfxSwapchain {
    /// Next presentable image; signals `semaphore` when it is ready to be
    /// rendered to.
    pub fn acquire(&self, semaphore: vk::Semaphore) -> GfxResult<AcquireResult> {
        let result = unsafe {
            self.loader
                .acquire_next_image(self.handle, u64::MAX, semaphore, vk::Fence::null())
        };
        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireResult::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
            Err(err) => Err(err.into()),
        }
    }

    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> GfxResult<PresentResult> {
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(std::slice::from_ref(&wait_semaphore))
            .swapchains(std::slice::from_ref(&self.handle))
            .image_indices(std::slice::from_ref(&image_index));
        let result = unsafe { self.loader.queue_present(queue, &present_info) };
        match result {
            Ok(false) => Ok(PresentResult::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentResult::Stale),
            Err(err) => Err(err.into()),
        }
    }
}

// destroy
impl GfxSwapchain {
    pub fn destroy(&mut self) {
        if self.handle == vk::SwapchainKHR::null() {
            return;
        }
        unsafe {
            for view in self.views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
        self.handle = vk::SwapchainKHR::null();
        self.images.clear();
    }
}

impl Drop for GfxSwapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Prefer BGRA8 sRGB; otherwise take whatever the surface lists first.
pub fn pick_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .copied()
        .unwrap_or(formats[0])
}

/// MAILBOX when offered, else FIFO, which every conformant driver has.
pub fn pick_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface dictates the extent when it reports a fixed one; otherwise the
/// desired size is clamped into the supported range.
pub fn clamp_extent(desired: vk::Extent2D, caps: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: desired
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: desired
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum so acquire rarely blocks; `max_image_count` of 0
/// means unbounded.
pub fn pick_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        desired
    } else {
        desired.min(caps.max_image_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min_count: u32, max_count: u32, current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: current,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn surface_format_prefers_bgra8_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(pick_surface_format(&formats).format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn surface_format_falls_back_to_first() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(pick_surface_format(&formats).format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(pick_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            pick_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_follows_surface_when_fixed() {
        let fixed = vk::Extent2D { width: 800, height: 600 };
        let got = clamp_extent(vk::Extent2D { width: 123, height: 456 }, &caps(2, 8, fixed));
        assert_eq!(got, fixed);
    }

    #[test]
    fn extent_clamps_when_surface_leaves_it_open() {
        let open = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        let got = clamp_extent(
            vk::Extent2D {
                width: 10_000,
                height: 0,
            },
            &caps(2, 8, open),
        );
        assert_eq!(got, vk::Extent2D { width: 4096, height: 1 });
    }

    #[test]
    fn image_count_is_min_plus_one_clamped() {
        let open = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        assert_eq!(pick_image_count(&caps(2, 8, open)), 3);
        assert_eq!(pick_image_count(&caps(3, 3, open)), 3);
        // max of 0 means no upper bound
        assert_eq!(pick_image_count(&caps(4, 0, open)), 5);
    }
}
