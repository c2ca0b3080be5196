//! Startup configuration.
//!
//! Configuration is read once at startup, either from defaults, a TOML file or
//! command line overrides applied by the executable. Nothing here is reloaded at
//! runtime; the only size change the renderer reacts to afterwards is a window
//! resize.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Presentation mode the swapchain should try first.
///
/// FIFO is always available, so every other preference falls back to it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentModePreference {
    /// Vsync, never tears.
    #[default]
    Fifo,
    /// Low latency without tearing when the driver supports it.
    Mailbox,
    /// No vsync.
    Immediate,
}

/// Renderer startup configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Initial window width in physical pixels.
    pub width: u32,
    /// Initial window height in physical pixels.
    pub height: u32,
    /// Free-form display string used for the window title and the Vulkan application info.
    pub application_name: String,
    /// Request the Khronos validation layer.
    pub enable_validation: bool,
    /// Preferred swapchain present mode.
    pub present_mode: PresentModePreference,
    /// Width of the fixed-size scene image.
    pub scene_width: u32,
    /// Height of the fixed-size scene image.
    pub scene_height: u32,
    /// RGBA color the draw images are cleared to every frame.
    pub clear_color: [f32; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            application_name: "L System Visualizer".to_string(),
            enable_validation: cfg!(debug_assertions),
            present_mode: PresentModePreference::Fifo,
            scene_width: 600,
            scene_height: 600,
            clear_color: [1.0, 0.0, 1.0, 1.0],
        }
    }
}

impl RenderConfig {
    /// Parses a configuration from TOML text. Missing keys take their default values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading render config from {:?}", path);
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Rejects values the renderer cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.scene_width == 0 || self.scene_height == 0 {
            return Err(Error::Config(format!(
                "scene size must be non-zero, got {}x{}",
                self.scene_width, self.scene_height
            )));
        }
        if self.application_name.trim().is_empty() {
            return Err(Error::Config("application name must not be empty".to_string()));
        }
        if self.application_name.contains('\0') {
            return Err(Error::Config(
                "application name must not contain NUL bytes".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RenderConfig::default();
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.application_name, "L System Visualizer");
        assert_eq!(config.present_mode, PresentModePreference::Fifo);
        assert_eq!((config.scene_width, config.scene_height), (600, 600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RenderConfig::from_toml_str(
            r#"
            width = 1920
            present_mode = "mailbox"
            "#,
        )
        .unwrap();
        assert_eq!(config.width, 1920);
        assert_eq!(config.height, 720);
        assert_eq!(config.present_mode, PresentModePreference::Mailbox);
    }

    #[test]
    fn test_zero_extent_is_rejected() {
        let err = RenderConfig::from_toml_str("height = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let config = RenderConfig {
            scene_width: 0,
            ..RenderConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_application_name_is_rejected() {
        let config = RenderConfig {
            application_name: "   ".to_string(),
            ..RenderConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let err = RenderConfig::from_toml_str("width = \"wide\"").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = RenderConfig::load(Path::new("does/not/exist.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigFile { .. }));
    }
}
