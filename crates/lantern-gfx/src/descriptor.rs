use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::error::GfxResult;
use crate::gfx::GfxDevice;

/// One fixed-size pool for the whole renderer. Exhausting it is fatal; the
/// sizes are generous enough that running out means a resource leak, not a
/// workload that needs a second pool.
pub struct GfxDescriptorPool {
    handle: vk::DescriptorPool,
    device: Rc<GfxDevice>,
}

// new & init
impl GfxDescriptorPool {
    const POOL_SIZES: [(vk::DescriptorType, u32); 2] = [
        (vk::DescriptorType::UNIFORM_BUFFER, 100),
        (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 100),
    ];
    const MAX_SETS: u32 = 1000;

    pub fn new(device: Rc<GfxDevice>, debug_name: &str) -> GfxResult<Self> {
        let pool_sizes = Self::POOL_SIZES
            .iter()
            .map(|(ty, count)| vk::DescriptorPoolSize {
                ty: *ty,
                descriptor_count: *count,
            })
            .collect_vec();
        let ci = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(Self::MAX_SETS)
            .pool_sizes(&pool_sizes);
        let handle = unsafe { device.create_descriptor_pool(&ci, None)? };
        device.set_debug_name(handle, debug_name);
        Ok(Self { handle, device })
    }
}

// tools
impl GfxDescriptorPool {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }

    pub fn alloc_set(
        &self,
        layout: vk::DescriptorSetLayout,
        debug_name: &str,
    ) -> GfxResult<vk::DescriptorSet> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.handle)
            .set_layouts(std::slice::from_ref(&layout));
        let set = unsafe { self.device.allocate_descriptor_sets(&alloc_info)?[0] };
        self.device.set_debug_name(set, debug_name);
        Ok(set)
    }

    pub fn free_set(&self, set: vk::DescriptorSet) -> GfxResult<()> {
        unsafe {
            self.device
                .free_descriptor_sets(self.handle, std::slice::from_ref(&set))?;
        }
        Ok(())
    }
}

// destroy
impl GfxDescriptorPool {
    pub fn destroy(&mut self) {
        if self.handle == vk::DescriptorPool::null() {
            return;
        }
        unsafe { self.device.destroy_descriptor_pool(self.handle, None) };
        self.handle = vk::DescriptorPool::null();
    }
}

impl Drop for GfxDescriptorPool {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// A binding slot to fill when updating a descriptor set.
pub enum DescriptorWrite {
    UniformBuffer {
        binding: u32,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    },
    CombinedImageSampler {
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    },
}

/// Push a batch of writes to one set. Buffer and image infos have to outlive
/// the update call, hence the two side vectors.
pub fn update_descriptor_set(device: &GfxDevice, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
    let buffer_infos = writes
        .iter()
        .map(|w| match w {
            DescriptorWrite::UniformBuffer { buffer, range, .. } => {
                vk::DescriptorBufferInfo::default().buffer(*buffer).range(*range)
            }
            _ => vk::DescriptorBufferInfo::default(),
        })
        .collect_vec();
    let image_infos = writes
        .iter()
        .map(|w| match w {
            DescriptorWrite::CombinedImageSampler { view, sampler, .. } => {
                vk::DescriptorImageInfo::default()
                    .image_view(*view)
                    .sampler(*sampler)
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            }
            _ => vk::DescriptorImageInfo::default(),
        })
        .collect_vec();

    let vk_writes = writes
        .iter()
        .enumerate()
        .map(|(i, w)| match w {
            DescriptorWrite::UniformBuffer { binding, .. } => vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(*binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(std::slice::from_ref(&buffer_infos[i])),
            DescriptorWrite::CombinedImageSampler { binding, .. } => {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(&image_infos[i]))
            }
        })
        .collect_vec();

    unsafe { device.update_descriptor_sets(&vk_writes, &[]) };
}

/// Build a set layout from (binding, type, stages) triples.
pub fn create_set_layout(
    device: &GfxDevice,
    bindings: &[(u32, vk::DescriptorType, vk::ShaderStageFlags)],
    debug_name: &str,
) -> GfxResult<vk::DescriptorSetLayout> {
    let vk_bindings = bindings
        .iter()
        .map(|(binding, ty, stages)| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(*binding)
                .descriptor_type(*ty)
                .descriptor_count(1)
                .stage_flags(*stages)
        })
        .collect_vec();
    let ci = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
    let layout = unsafe { device.create_descriptor_set_layout(&ci, None)? };
    device.set_debug_name(layout, debug_name);
    Ok(layout)
}
