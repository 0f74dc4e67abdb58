use std::path::{Path, PathBuf};
use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::error::{GfxError, GfxResult};
use crate::gfx::GfxDevice;

/// Everything needed to build one graphics pipeline against dynamic
/// rendering: no render pass, the attachment formats are baked in instead.
pub struct GraphicsPipelineDesc {
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
}

pub struct GfxGraphicsPipeline {
    handle: vk::Pipeline,
    layout: vk::PipelineLayout,
    device: Rc<GfxDevice>,
}

// new & init
impl GfxGraphicsPipeline {
    pub fn new(device: Rc<GfxDevice>, desc: &GraphicsPipelineDesc, debug_name: &str) -> GfxResult<Self> {
        let vs_module = Self::load_shader_module(&device, &desc.vertex_shader)?;
        let fs_module = Self::load_shader_module(&device, &desc.fragment_shader)?;

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vs_module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fs_module)
                .name(c"main"),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&desc.vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        // actual viewport/scissor are set at record time
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS);

        let blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(std::slice::from_ref(&blend_attachment));

        let layout_ci = vk::PipelineLayoutCreateInfo::default().set_layouts(&desc.set_layouts);
        let layout = unsafe { device.create_pipeline_layout(&layout_ci, None)? };
        device.set_debug_name(layout, &format!("{debug_name}-layout"));

        let color_formats = [desc.color_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(desc.depth_format);

        let pipeline_ci = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&pipeline_ci),
                None,
            )
        };
        unsafe {
            device.destroy_shader_module(vs_module, None);
            device.destroy_shader_module(fs_module, None);
        }
        let handle = pipelines.map_err(|(_, err)| GfxError::Vk(err))?[0];
        device.set_debug_name(handle, debug_name);

        Ok(Self { handle, layout, device })
    }

    fn load_shader_module(device: &GfxDevice, path: &Path) -> GfxResult<vk::ShaderModule> {
        let mut file = std::fs::File::open(path).map_err(|source| GfxError::ShaderIo {
            path: path.to_path_buf(),
            source,
        })?;
        let code = ash::util::read_spv(&mut file).map_err(|source| GfxError::ShaderIo {
            path: path.to_path_buf(),
            source,
        })?;
        let ci = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.create_shader_module(&ci, None)? };
        Ok(module)
    }
}

// getter
impl GfxGraphicsPipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

// destroy
impl GfxGraphicsPipeline {
    pub fn destroy(&mut self) {
        if self.handle == vk::Pipeline::null() {
            return;
        }
        unsafe {
            self.device.destroy_pipeline(self.handle, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
        self.handle = vk::Pipeline::null();
        self.layout = vk::PipelineLayout::null();
    }
}

impl Drop for GfxGraphicsPipeline {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Binding and attribute helpers shared by pipeline construction and the
/// vertex-format declarations in the renderer.
pub fn vertex_binding(
    binding: u32,
    stride: u32,
    rate: vk::VertexInputRate,
) -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding,
        stride,
        input_rate: rate,
    }
}

/// A run of consecutive vec4 attributes, one location per 16 bytes. Used for
/// matrix-heavy per-instance streams.
pub fn vec4_attributes(
    binding: u32,
    first_location: u32,
    count: u32,
) -> Vec<vk::VertexInputAttributeDescription> {
    (0..count)
        .map(|i| vk::VertexInputAttributeDescription {
            location: first_location + i,
            binding,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: i * 16,
        })
        .collect_vec()
}
