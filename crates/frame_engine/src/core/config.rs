//! # Configuration Types
//!
//! Configuration for the renderer, the window that hosts it, and the application
//! as a whole. All types are serializable through the [`Config`] trait (TOML or RON).

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::config::{Config, ConfigError};

/// # Shader Configuration
///
/// Paths of the SPIR-V binaries the pipeline is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Tries the common shader output directories so the application can be started
    /// from the workspace root or from its own crate directory.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        const SHADER_DIRS: [&str; 5] = ["target/shaders/", "../target/shaders/", "shaders/", "resources/shaders/", "./"];

        let resolve = |file: &str| {
            SHADER_DIRS
                .iter()
                .map(|dir| format!("{dir}{file}"))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("target/shaders/{file}"))
        };

        Self {
            vertex_shader_path: resolve(base_vertex),
            fragment_shader_path: resolve(base_fragment),
        }
    }

    /// Validate that shader files exist
    pub fn validate(&self) -> Result<(), String> {
        if !Path::new(&self.vertex_shader_path).exists() {
            return Err(format!("Vertex shader not found: {}", self.vertex_shader_path));
        }
        if !Path::new(&self.fragment_shader_path).exists() {
            return Err(format!("Fragment shader not found: {}", self.fragment_shader_path));
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("quad.vert.spv", "quad.frag.spv")
    }
}

/// Rule used to pick one adapter when several pass every capability check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceSelectionPolicy {
    /// Keep the last suitable adapter in enumeration order
    #[default]
    LastSuitable,
    /// Rank by device type (discrete first), then by device-local memory;
    /// ties go to the later adapter
    PreferDiscrete,
}

/// # Vulkan Renderer Configuration
///
/// Application metadata, frame pacing and resource limits for the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Number of frame slots cycled round-robin
    pub max_frames_in_flight: usize,
    /// Whether to enable Vulkan validation layers; `None` enables them in debug builds
    pub enable_validation: Option<bool>,
    /// Adapter choice among suitable candidates
    pub device_selection: DeviceSelectionPolicy,
    /// Upper bound for fence and device-idle waits, in milliseconds
    pub idle_timeout_ms: u64,
    /// Size of the combined-image-sampler array bound at binding 1
    pub max_textures: u32,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            shaders: ShaderConfig::default(),
            max_frames_in_flight: 2,
            enable_validation: None,
            device_selection: DeviceSelectionPolicy::default(),
            idle_timeout_ms: 5_000,
            max_textures: 16,
        }
    }

    /// Set custom shader configuration
    #[must_use]
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set the number of frames in flight
    #[must_use]
    pub const fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    #[must_use]
    pub const fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the adapter selection policy
    #[must_use]
    pub const fn with_device_selection(mut self, policy: DeviceSelectionPolicy) -> Self {
        self.device_selection = policy;
        self
    }

    /// Set the bounded wait used for fences and device idle
    #[must_use]
    pub const fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    /// Set the texture array size
    #[must_use]
    pub const fn with_max_textures(mut self, max_textures: u32) -> Self {
        self.max_textures = max_textures;
        self
    }

    /// Whether validation layers should be requested
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Idle timeout in nanoseconds, as Vulkan wait calls expect
    pub const fn idle_timeout_ns(&self) -> u64 {
        self.idle_timeout_ms.saturating_mul(1_000_000)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }
        if self.max_frames_in_flight == 0 {
            return Err("Max frames in flight must be at least 1".to_string());
        }
        if self.max_frames_in_flight > 8 {
            return Err("Max frames in flight should not exceed 8".to_string());
        }
        if self.idle_timeout_ms == 0 {
            return Err("Idle timeout must be greater than zero".to_string());
        }
        if self.max_textures == 0 {
            return Err("Max textures must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Frame Engine Application")
    }
}

/// # Window Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl WindowConfig {
    /// Create a new window configuration
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            width,
            height,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("Window size must be non-zero, got {}x{}", self.width, self.height));
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new("Frame Engine", 800, 600)
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration an embedding application loads at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Default log filter, overridden by `RUST_LOG`
    pub log_level: String,
    /// Window configuration
    pub window: WindowConfig,
    /// Rendering system configuration
    pub renderer: RendererConfig,
}

impl ApplicationConfig {
    /// Create a new application configuration with defaults
    pub fn new(app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();
        Self {
            log_level: "info".to_string(),
            window: WindowConfig::new(app_name.clone(), 800, 600),
            renderer: RendererConfig::new(app_name),
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), String> {
        self.window.validate()?;
        self.renderer.validate()
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self::new("Frame Engine Application")
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_renderer_config_is_valid() {
        let config = RendererConfig::default();
        assert_eq!(config.max_frames_in_flight, 2);
        assert_eq!(config.device_selection, DeviceSelectionPolicy::LastSuitable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_renderer_config_rejects_bad_frame_counts() {
        assert!(RendererConfig::default().with_max_frames_in_flight(0).validate().is_err());
        assert!(RendererConfig::default().with_max_frames_in_flight(9).validate().is_err());
        assert!(RendererConfig::default().with_max_frames_in_flight(3).validate().is_ok());
    }

    #[test]
    fn test_renderer_config_rejects_zero_limits() {
        assert!(RendererConfig::default().with_idle_timeout_ms(0).validate().is_err());
        assert!(RendererConfig::default().with_max_textures(0).validate().is_err());
    }

    #[test]
    fn test_idle_timeout_conversion() {
        let config = RendererConfig::default().with_idle_timeout_ms(250);
        assert_eq!(config.idle_timeout_ns(), 250_000_000);
        assert_eq!(RendererConfig::default().with_idle_timeout_ms(u64::MAX).idle_timeout_ns(), u64::MAX);
    }

    #[test]
    fn test_explicit_validation_flag_wins() {
        assert!(RendererConfig::default().with_validation(true).validation_enabled());
        assert!(!RendererConfig::default().with_validation(false).validation_enabled());
    }

    #[test]
    fn test_window_config_rejects_zero_size() {
        assert!(WindowConfig::new("w", 0, 600).validate().is_err());
        assert!(WindowConfig::default().validate().is_ok());
    }

    #[test]
    fn test_application_config_toml_round_trip() {
        let path = std::env::temp_dir().join(format!("frame_engine_config_{}.toml", std::process::id()));
        let mut config = ApplicationConfig::new("Round Trip");
        config.renderer = config
            .renderer
            .with_device_selection(DeviceSelectionPolicy::PreferDiscrete)
            .with_max_textures(4);

        config.save_to_file(&path).expect("save config");
        let loaded = ApplicationConfig::load_from_file(&path).expect("load config");
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.renderer.application_name, "Round Trip");
        assert_eq!(loaded.renderer.device_selection, DeviceSelectionPolicy::PreferDiscrete);
        assert_eq!(loaded.renderer.max_textures, 4);
        assert_eq!(loaded.window.width, 800);
    }

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("frame_engine_definitely_missing_config.ron");
        let config = ApplicationConfig::load_or_default(&path).expect("defaults");
        assert_eq!(config.log_level, "info");
    }
}
