use std::ffi::CStr;
use std::ops::Deref;
use std::rc::Rc;

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use crate::error::{GfxError, GfxResult};

/// Owns the vulkan entry points and the instance handle.
///
/// Kept behind an `Rc` so that everything derived from the instance keeps it
/// alive until the last user is gone.
pub struct GfxInstance {
    pub entry: ash::Entry,
    handle: ash::Instance,
}

impl GfxInstance {
    const ENGINE_NAME: &'static CStr = c"lantern";

    pub fn new(app_name: &CStr, display_handle: Option<RawDisplayHandle>) -> GfxResult<Self> {
        let entry = unsafe { ash::Entry::load()? };

        let app_info = vk::ApplicationInfo::default()
            .application_name(app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(Self::ENGINE_NAME)
            .api_version(vk::API_VERSION_1_3);

        let mut extensions: Vec<*const std::ffi::c_char> = Vec::new();
        if let Some(display) = display_handle {
            extensions.extend_from_slice(ash_window::enumerate_required_extensions(display)?);
        }
        if Self::debug_utils_available(&entry) {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions);
        let handle = unsafe { entry.create_instance(&instance_ci, None)? };

        Ok(Self { entry, handle })
    }

    fn debug_utils_available(entry: &ash::Entry) -> bool {
        let Ok(props) = (unsafe { entry.enumerate_instance_extension_properties(None) }) else {
            return false;
        };
        props.iter().any(|p| {
            p.extension_name_as_c_str()
                .map(|name| name == ash::ext::debug_utils::NAME)
                .unwrap_or(false)
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.handle
    }
}

impl Drop for GfxInstance {
    fn drop(&mut self) {
        unsafe { self.handle.destroy_instance(None) }
    }
}

/// The logical device plus the bits of context that travel with it
/// everywhere: the queue family in use and the debug-name loader.
pub struct GfxDevice {
    handle: ash::Device,
    graphics_queue_family: u32,
    debug_utils: Option<ash::ext::debug_utils::Device>,

    // the instance must outlive the device
    instance: Rc<GfxInstance>,
}

impl Deref for GfxDevice {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

// new & init
impl GfxDevice {
    fn new(
        instance: Rc<GfxInstance>,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
        with_debug_utils: bool,
    ) -> GfxResult<Self> {
        let queue_priorities = [1.0_f32];
        let queue_ci = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(graphics_queue_family)
            .queue_priorities(&queue_priorities);

        let device_extensions = [ash::khr::swapchain::NAME.as_ptr()];
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let device_ci = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_ci))
            .enabled_extension_names(&device_extensions)
            .push_next(&mut features13);

        let handle =
            unsafe { instance.handle().create_device(physical_device, &device_ci, None)? };

        let debug_utils = with_debug_utils
            .then(|| ash::ext::debug_utils::Device::new(instance.handle(), &handle));

        Ok(Self {
            handle,
            graphics_queue_family,
            debug_utils,
            instance,
        })
    }
}

// getters & tools
impl GfxDevice {
    #[inline]
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        self.instance.handle()
    }

    /// Attach a debug name to a vulkan handle. No-op when the debug-utils
    /// extension is unavailable.
    pub fn set_debug_name<H: vk::Handle>(&self, handle: H, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = std::ffi::CString::new(name) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&name);
        unsafe {
            let _ = debug_utils.set_debug_utils_object_name(&info);
        }
    }

    pub fn wait_idle(&self) {
        unsafe {
            // device loss here is fatal by contract, nothing to recover
            self.handle.device_wait_idle().expect("device_wait_idle failed");
        }
    }
}

impl Drop for GfxDevice {
    fn drop(&mut self) {
        unsafe { self.handle.destroy_device(None) }
    }
}

/// vk-mem allocator. Holds the device alive: vma references device function
/// pointers for as long as it exists and must be destroyed first.
pub struct GfxAllocator {
    inner: vk_mem::Allocator,
    device: Rc<GfxDevice>,
}

impl Deref for GfxAllocator {
    type Target = vk_mem::Allocator;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl GfxAllocator {
    pub fn new(device: Rc<GfxDevice>, physical_device: vk::PhysicalDevice) -> GfxResult<Self> {
        let mut vma_ci =
            vk_mem::AllocatorCreateInfo::new(device.instance(), &device, physical_device);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;

        let inner = unsafe { vk_mem::Allocator::new(vma_ci)? };
        Ok(Self { inner, device })
    }

    #[inline]
    pub fn device(&self) -> &Rc<GfxDevice> {
        &self.device
    }
}

/// The provided GPU capability: instance, physical device, logical device,
/// the graphics queue, and the allocator. Everything above this layer
/// receives it by reference; there is no process-global handle.
pub struct Gfx {
    instance: Rc<GfxInstance>,
    physical_device: vk::PhysicalDevice,
    pub device: Rc<GfxDevice>,
    pub allocator: Rc<GfxAllocator>,
    graphics_queue: vk::Queue,
}

// new & init
impl Gfx {
    pub fn new(app_name: &CStr, display_handle: Option<RawDisplayHandle>) -> GfxResult<Self> {
        let instance = Rc::new(GfxInstance::new(app_name, display_handle)?);
        let (physical_device, graphics_queue_family) = Self::pick_physical_device(&instance)?;

        let with_debug_utils = GfxInstance::debug_utils_available(&instance.entry);
        let device = Rc::new(GfxDevice::new(
            instance.clone(),
            physical_device,
            graphics_queue_family,
            with_debug_utils,
        )?);
        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };
        device.set_debug_name(graphics_queue, "main-graphics-queue");

        let allocator = Rc::new(GfxAllocator::new(device.clone(), physical_device)?);

        log::info!("gfx layer ready, queue family {}", graphics_queue_family);
        Ok(Self {
            instance,
            physical_device,
            device,
            allocator,
            graphics_queue,
        })
    }

    /// Prefer a discrete GPU with a graphics queue; fall back to any device
    /// that has one.
    fn pick_physical_device(instance: &GfxInstance) -> GfxResult<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.handle().enumerate_physical_devices()? };

        let mut fallback = None;
        for pdevice in devices {
            let Some(family) = Self::find_graphics_family(instance, pdevice) else {
                continue;
            };
            let props = unsafe { instance.handle().get_physical_device_properties(pdevice) };
            if props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
                return Ok((pdevice, family));
            }
            fallback.get_or_insert((pdevice, family));
        }
        fallback.ok_or(GfxError::NoSuitableDevice)
    }

    fn find_graphics_family(instance: &GfxInstance, pdevice: vk::PhysicalDevice) -> Option<u32> {
        let families = unsafe {
            instance
                .handle()
                .get_physical_device_queue_family_properties(pdevice)
        };
        families
            .iter()
            .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32)
    }
}

// getters
impl Gfx {
    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        self.instance.handle()
    }

    #[inline]
    pub fn entry(&self) -> &ash::Entry {
        &self.instance.entry
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }
}
