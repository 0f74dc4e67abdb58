//! Thin, explicit wrappers over ash and vk-mem.
//!
//! Everything here is handed around by value or `Rc`; no global device,
//! no hidden state. Teardown order is encoded in the `Rc` chain: instance
//! outlives device, device outlives allocator, allocator outlives every
//! buffer and image carved out of it.

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod error;
pub mod gfx;
pub mod image;
pub mod pipeline;
pub mod swapchain;
pub mod sync;

pub use buffer::GfxBuffer;
pub use command::{one_time_submit, GfxCommandBuffer, GfxCommandPool};
pub use descriptor::{create_set_layout, update_descriptor_set, DescriptorWrite, GfxDescriptorPool};
pub use error::{GfxError, GfxResult};
pub use gfx::{Gfx, GfxAllocator, GfxDevice, GfxInstance};
pub use image::{GfxImage2D, GfxTexture};
pub use pipeline::{vec4_attributes, vertex_binding, GfxGraphicsPipeline, GraphicsPipelineDesc};
pub use swapchain::{
    AcquireResult, GfxSurface, GfxSwapchain, PresentResult,
};
pub use sync::{GfxFence, GfxSemaphore};
