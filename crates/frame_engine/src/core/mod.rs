//! # Core Module
//!
//! Shared configuration types for the render core and its embedding application.

pub mod config;

pub use config::{
    ApplicationConfig, Config, ConfigError, DeviceSelectionPolicy, RendererConfig, ShaderConfig, WindowConfig,
};
