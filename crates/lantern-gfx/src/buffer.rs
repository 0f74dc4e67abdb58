use std::rc::Rc;

use ash::vk;
use vk_mem::Alloc;

use crate::command::one_time_submit;
use crate::error::GfxResult;
use crate::gfx::{Gfx, GfxAllocator};

/// vk-mem backed buffer.
///
/// Host-visible buffers are persistently mapped on creation; device-local
/// buffers are filled once through a staging copy.
pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: Option<vk_mem::Allocation>,
    map_ptr: Option<*mut u8>,
    size: vk::DeviceSize,

    allocator: Rc<GfxAllocator>,
}

// new & init
impl GfxBuffer {
    pub fn new(
        allocator: Rc<GfxAllocator>,
        size: vk::DeviceSize,
        buffer_usage: vk::BufferUsageFlags,
        mem_usage: vk_mem::MemoryUsage,
        alloc_flags: vk_mem::AllocationCreateFlags,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let buffer_ci = vk::BufferCreateInfo {
            size,
            usage: buffer_usage,
            ..Default::default()
        };
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: mem_usage,
            flags: alloc_flags,
            ..Default::default()
        };

        let (handle, mut allocation) = unsafe { allocator.create_buffer(&buffer_ci, &alloc_ci)? };
        allocator.device().set_debug_name(handle, debug_name);

        let map_ptr = if alloc_flags.contains(vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE)
        {
            Some(unsafe { allocator.map_memory(&mut allocation)? })
        } else {
            None
        };

        Ok(Self {
            handle,
            allocation: Some(allocation),
            map_ptr,
            size,
            allocator,
        })
    }

    /// Device-local buffer filled once with `data` through a staging copy.
    pub fn new_device_local(
        gfx: &Gfx,
        data: &[u8],
        usage: vk::BufferUsageFlags,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let size = data.len() as vk::DeviceSize;
        let buffer = Self::new(
            gfx.allocator.clone(),
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk_mem::MemoryUsage::AutoPreferDevice,
            vk_mem::AllocationCreateFlags::empty(),
            debug_name,
        )?;

        let mut stage = Self::new_host_visible(
            gfx.allocator.clone(),
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            &format!("{debug_name}-stage"),
        )?;
        stage.write(0, data)?;

        one_time_submit(&gfx.device, gfx.graphics_queue(), debug_name, |cmd| {
            cmd.copy_buffer(stage.handle, buffer.handle, size);
        })?;
        stage.destroy();

        Ok(buffer)
    }

    pub fn new_vertex_buffer(gfx: &Gfx, data: &[u8], debug_name: &str) -> GfxResult<Self> {
        Self::new_device_local(gfx, data, vk::BufferUsageFlags::VERTEX_BUFFER, debug_name)
    }

    pub fn new_index_buffer(gfx: &Gfx, data: &[u8], debug_name: &str) -> GfxResult<Self> {
        Self::new_device_local(gfx, data, vk::BufferUsageFlags::INDEX_BUFFER, debug_name)
    }

    /// Host-visible, persistently mapped.
    pub fn new_host_visible(
        allocator: Rc<GfxAllocator>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        debug_name: &str,
    ) -> GfxResult<Self> {
        Self::new(
            allocator,
            size,
            usage,
            vk_mem::MemoryUsage::Auto,
            vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            debug_name,
        )
    }

    /// Per-instance vertex stream, rewritten by the host every frame.
    pub fn new_instance_buffer(
        allocator: Rc<GfxAllocator>,
        size: vk::DeviceSize,
        debug_name: &str,
    ) -> GfxResult<Self> {
        Self::new_host_visible(allocator, size, vk::BufferUsageFlags::VERTEX_BUFFER, debug_name)
    }

    pub fn new_uniform_buffer(
        allocator: Rc<GfxAllocator>,
        size: vk::DeviceSize,
        debug_name: &str,
    ) -> GfxResult<Self> {
        Self::new_host_visible(allocator, size, vk::BufferUsageFlags::UNIFORM_BUFFER, debug_name)
    }
}

// tools
impl GfxBuffer {
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Copy `bytes` into the mapped range at `offset` and flush.
    /// Panics if the buffer is not host-visible; writing a device-local
    /// buffer after creation is a programmer error.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> GfxResult<()> {
        let map_ptr = self.map_ptr.expect("write on a buffer with no host mapping");
        assert!(offset + bytes.len() <= self.size as usize);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), map_ptr.add(offset), bytes.len());
        }
        if let Some(allocation) = &self.allocation {
            self.allocator
                .flush_allocation(allocation, offset as vk::DeviceSize, bytes.len() as vk::DeviceSize)?;
        }
        Ok(())
    }

    /// The mapped contents. Only meaningful for host-visible buffers.
    pub fn mapped_slice(&self) -> &[u8] {
        let map_ptr = self.map_ptr.expect("mapped_slice on a buffer with no host mapping");
        unsafe { std::slice::from_raw_parts(map_ptr, self.size as usize) }
    }

    /// Idempotent teardown; the arena may route a second destroy here.
    pub fn destroy(&mut self) {
        let Some(mut allocation) = self.allocation.take() else {
            return;
        };
        unsafe {
            if self.map_ptr.take().is_some() {
                self.allocator.unmap_memory(&mut allocation);
            }
            self.allocator.destroy_buffer(self.handle, &mut allocation);
        }
        self.handle = vk::Buffer::null();
    }
}

impl Drop for GfxBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}
