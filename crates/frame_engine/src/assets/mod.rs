//! Asset decoding for GPU upload

pub mod image_loader;

pub use image_loader::{ImageCrateDecoder, ImageData, ImageDecoder};

/// Asset loading errors
#[derive(thiserror::Error, Debug)]
pub enum AssetError {
    /// Asset not found
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Failed to load asset
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Invalid asset data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Unsupported asset format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// IO error during asset loading
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
