use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// Startup configuration, read once. The renderer never writes it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// How many frames the CPU may run ahead of the GPU.
    pub frames_in_flight: usize,
    pub window_width: u32,
    pub window_height: u32,
    pub window_title: String,
    pub clear_color: [f32; 4],
    /// Directory holding the compiled .spv shader modules.
    pub shader_dir: PathBuf,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            window_width: 1280,
            window_height: 720,
            window_title: "lantern".to_string(),
            clear_color: [0.02, 0.02, 0.03, 1.0],
            shader_dir: PathBuf::from("shaders"),
        }
    }
}

impl RenderSettings {
    pub fn load(path: &Path) -> RenderResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| RenderError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = toml::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> RenderResult<()> {
        if self.frames_in_flight == 0 {
            return Err(RenderError::InvalidSettings(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.frames_in_flight > 8 {
            return Err(RenderError::InvalidSettings(format!(
                "frames_in_flight of {} is unreasonable, expected at most 8",
                self.frames_in_flight
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = RenderSettings::default();
        assert_eq!(settings.frames_in_flight, 2);
        settings.validate().unwrap();
    }

    #[test]
    fn parses_partial_toml() {
        let settings: RenderSettings =
            toml::from_str("frames_in_flight = 3\nwindow_width = 800").unwrap();
        assert_eq!(settings.frames_in_flight, 3);
        assert_eq!(settings.window_width, 800);
        // untouched fields keep their defaults
        assert_eq!(settings.window_height, 720);
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        let settings = RenderSettings {
            frames_in_flight: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
