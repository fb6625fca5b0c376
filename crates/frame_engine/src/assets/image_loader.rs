//! Image decoding for texture data
//!
//! Decoded images are tightly packed, non-premultiplied RGBA8. The default decoder
//! handles PNG, JPEG and GIF; other formats are rejected by extension before any
//! decoding is attempted.

use std::path::Path;

use image::ImageFormat;

use crate::assets::AssetError;

/// Bytes per RGBA8 pixel
pub const RGBA_BYTES_PER_PIXEL: usize = 4;

/// Decoded image data ready for GPU upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Raw RGBA pixel data, row-major with no padding
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Wrap already-decoded RGBA8 pixels, checking that they are tightly packed
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, AssetError> {
        let image = Self { data, width, height };
        image.validate()?;
        Ok(image)
    }

    /// Create a solid color image (useful for testing and defaults)
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = width as usize * height as usize;
        let data = color.iter().copied().cycle().take(pixel_count * RGBA_BYTES_PER_PIXEL).collect();
        Self { data, width, height }
    }

    /// Byte length a tightly packed RGBA8 image of these dimensions must have
    pub const fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * RGBA_BYTES_PER_PIXEL
    }

    /// Check dimensions and buffer length
    pub fn validate(&self) -> Result<(), AssetError> {
        if self.width == 0 || self.height == 0 {
            return Err(AssetError::InvalidData(format!(
                "image has zero area ({}x{})",
                self.width, self.height
            )));
        }
        let expected = Self::expected_len(self.width, self.height);
        if self.data.len() != expected {
            return Err(AssetError::InvalidData(format!(
                "expected {} bytes of RGBA for {}x{}, got {}",
                expected,
                self.width,
                self.height,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Get the size of the image data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Decoded-image provider
///
/// `url` identifies the resource and carries the extension used for format detection.
pub trait ImageDecoder {
    /// Decode encoded bytes into RGBA8
    fn decode(&self, url: &str, bytes: &[u8]) -> Result<ImageData, AssetError>;
}

/// Default decoder backed by the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateDecoder;

impl ImageCrateDecoder {
    /// Map a resource url to a supported raster format
    pub fn format_for(url: &str) -> Result<ImageFormat, AssetError> {
        let extension = Path::new(url)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| AssetError::UnsupportedFormat(format!("{url}: missing file extension")))?;

        match extension.as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "gif" => Ok(ImageFormat::Gif),
            "svg" => Err(AssetError::UnsupportedFormat(format!("{url}: svg support not implemented"))),
            other => Err(AssetError::UnsupportedFormat(format!("{url}: .{other} is not a supported image format"))),
        }
    }
}

impl ImageDecoder for ImageCrateDecoder {
    fn decode(&self, url: &str, bytes: &[u8]) -> Result<ImageData, AssetError> {
        let format = Self::format_for(url)?;

        let img = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| AssetError::LoadFailed(format!("Failed to decode {url}: {e}")))?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        log::debug!("Decoded {} as {}x{} RGBA", url, width, height);

        ImageData::from_rgba(width, height, rgba.into_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).expect("encode png");
        bytes.into_inner()
    }

    #[test]
    fn test_solid_color_image() {
        let img = ImageData::solid_color(4, 4, [255, 0, 0, 255]);
        assert_eq!(img.width, 4);
        assert_eq!(img.height, 4);
        assert_eq!(img.size_bytes(), 4 * 4 * 4);
        assert_eq!(&img.data[0..4], &[255, 0, 0, 255]);
        assert_eq!(&img.data[60..64], &[255, 0, 0, 255]);
        assert!(img.validate().is_ok());
    }

    #[test]
    fn test_from_rgba_rejects_short_buffer() {
        assert!(matches!(ImageData::from_rgba(2, 2, vec![0; 15]), Err(AssetError::InvalidData(_))));
        assert!(matches!(ImageData::from_rgba(0, 2, Vec::new()), Err(AssetError::InvalidData(_))));
        assert!(ImageData::from_rgba(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_decode_png_to_packed_rgba() {
        let decoded = ImageCrateDecoder.decode("textures/tile.PNG", &encode_png(2, 2)).expect("decode");
        assert_eq!((decoded.width, decoded.height), (2, 2));
        assert_eq!(decoded.size_bytes(), 16);
        assert_eq!(&decoded.data[0..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_svg_is_rejected_before_decoding() {
        let result = ImageCrateDecoder.decode("icons/logo.svg", b"<svg/>");
        assert!(matches!(result, Err(AssetError::UnsupportedFormat(msg)) if msg.contains("svg")));
    }

    #[test]
    fn test_supported_extensions() {
        assert_eq!(ImageCrateDecoder::format_for("a.jpg").ok(), Some(ImageFormat::Jpeg));
        assert_eq!(ImageCrateDecoder::format_for("a.jpeg").ok(), Some(ImageFormat::Jpeg));
        assert_eq!(ImageCrateDecoder::format_for("a.gif").ok(), Some(ImageFormat::Gif));
        assert!(ImageCrateDecoder::format_for("a.bmp").is_err());
        assert!(ImageCrateDecoder::format_for("noext").is_err());
    }

    #[test]
    fn test_corrupt_png_reports_load_failure() {
        let result = ImageCrateDecoder.decode("broken.png", &[0x89, b'P', b'N', b'G']);
        assert!(matches!(result, Err(AssetError::LoadFailed(_))));
    }
}
