//! Frame orchestration over `lantern-gfx`.
//!
//! The `RenderContext` runs the per-frame state machine (wait, acquire,
//! record, submit, present, advance), treats swapchain staleness as the
//! trigger for recreation rather than an error, and dispatches registered
//! scene renderers. The `RenderBackend` trait is the seam to the GPU:
//! `VulkanBackend` in production, `HeadlessBackend` in tests.

pub mod arena;
pub mod backend;
pub mod context;
pub mod error;
pub mod frame;
pub mod instanced;
pub mod logging;
pub mod scene;
pub mod settings;
pub mod uniforms;

pub use arena::{GpuArena, GpuHandle, GpuObject};
pub use backend::{
    BindGroupDesc, BindGroupKey, HeadlessBackend, InstancedDraw, PipelineDesc, PipelineKey,
    RenderBackend, VulkanBackend, WindowBridge,
};
pub use context::{FrameInfo, RenderContext, SceneRenderer};
pub use error::{RenderError, RenderResult};
pub use frame::{FrameCounter, FrameLabel};
pub use instanced::InstancedMeshRenderer;
pub use scene::{Camera, DirLight, Material, Mesh, MeshKey, Model, PointLight, Scene};
pub use settings::RenderSettings;
