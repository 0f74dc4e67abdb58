use std::rc::Rc;

use ash::vk;

use crate::error::GfxResult;
use crate::gfx::GfxDevice;

/// CPU/GPU handoff primitive. Waitable from the host.
pub struct GfxFence {
    handle: vk::Fence,
    device: Rc<GfxDevice>,
}

// new & destroy
impl GfxFence {
    /// `signaled` creates the fence pre-signaled so the first wait on a
    /// frame slot never blocks.
    pub fn new(device: Rc<GfxDevice>, signaled: bool, debug_name: &str) -> GfxResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let handle =
            unsafe { device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None)? };
        device.set_debug_name(handle, debug_name);
        Ok(Self { handle, device })
    }

    /// Idempotent teardown; safe to call twice.
    pub fn destroy(&mut self) {
        if self.handle == vk::Fence::null() {
            return;
        }
        unsafe { self.device.destroy_fence(self.handle, None) };
        self.handle = vk::Fence::null();
    }
}

// tools
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Block the host until the fence signals. No finite timeout; a
    /// non-responsive device is fatal.
    pub fn wait(&self) -> GfxResult<()> {
        unsafe {
            self.device
                .wait_for_fences(std::slice::from_ref(&self.handle), true, u64::MAX)?;
        }
        Ok(())
    }

    pub fn reset(&self) -> GfxResult<()> {
        unsafe {
            self.device
                .reset_fences(std::slice::from_ref(&self.handle))?;
        }
        Ok(())
    }
}

impl Drop for GfxFence {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// GPU-side ordering primitive, binary.
pub struct GfxSemaphore {
    handle: vk::Semaphore,
    device: Rc<GfxDevice>,
}

impl GfxSemaphore {
    pub fn new(device: Rc<GfxDevice>, debug_name: &str) -> GfxResult<Self> {
        let handle =
            unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)? };
        device.set_debug_name(handle, debug_name);
        Ok(Self { handle, device })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }

    pub fn destroy(&mut self) {
        if self.handle == vk::Semaphore::null() {
            return;
        }
        unsafe { self.device.destroy_semaphore(self.handle, None) };
        self.handle = vk::Semaphore::null();
    }
}

impl Drop for GfxSemaphore {
    fn drop(&mut self) {
        self.destroy();
    }
}
