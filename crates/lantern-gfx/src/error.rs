use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

pub type GfxResult<T> = Result<T, GfxError>;

/// Errors surfaced by the gfx layer during setup.
///
/// Steady-state frame-loop staleness (out-of-date / suboptimal swapchain) is
/// not an error and never appears here; it is reported as data by the
/// swapchain acquire/present calls.
#[derive(Debug, Error)]
pub enum GfxError {
    #[error("vulkan call failed: {0}")]
    Vk(#[from] vk::Result),

    #[error("failed to load the vulkan library: {0}")]
    EntryLoad(#[from] ash::LoadingError),

    #[error("no physical device with a graphics queue was found")]
    NoSuitableDevice,

    #[error("the surface reports no usable formats or present modes")]
    SurfaceUnsupported,

    #[error("failed to read shader bytecode from {path}: {source}")]
    ShaderIo {
        path: PathBuf,
        source: std::io::Error,
    },
}
