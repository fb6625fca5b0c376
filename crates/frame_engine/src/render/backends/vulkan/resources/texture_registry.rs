//! Texture registry
//!
//! Textures are keyed by url. Iteration is in url order, and a texture's position
//! in that order is its index in the shader's sampler array, so the index of a
//! texture only changes when a texture with a smaller url is added or removed.
//!
//! Textures requested before the renderer exists are decoded immediately and kept
//! as pending pixel data; the renderer uploads them during initialization.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use ash::vk;

use crate::assets::{AssetError, ImageCrateDecoder, ImageData, ImageDecoder};
use crate::render::backends::vulkan::resources::texture::Texture;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Loaded textures plus decoded images waiting for upload
pub struct TextureRegistry {
    decoder: Box<dyn ImageDecoder>,
    textures: BTreeMap<String, Texture>,
    pending: Vec<(String, ImageData)>,
}

impl TextureRegistry {
    /// Empty registry decoding with the `image` crate
    pub fn new() -> Self {
        Self::with_decoder(Box::new(ImageCrateDecoder))
    }

    /// Empty registry with a custom decoder
    pub fn with_decoder(decoder: Box<dyn ImageDecoder>) -> Self {
        Self {
            decoder,
            textures: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    /// Decode `bytes` as the image named by `url`
    pub fn decode(&self, url: &str, bytes: &[u8]) -> VulkanResult<ImageData> {
        Ok(self.decoder.decode(url, bytes)?)
    }

    /// Decode now and keep the pixels until the renderer uploads them
    ///
    /// Queuing a url twice keeps only the latest image.
    pub fn queue(&mut self, url: impl Into<String>, bytes: &[u8]) -> VulkanResult<()> {
        let url = url.into();
        let image = self.decode(&url, bytes)?;
        self.pending.retain(|(queued, _)| *queued != url);
        self.pending.push((url, image));
        Ok(())
    }

    /// Read and queue a file, keyed by its path
    pub fn queue_file(&mut self, path: impl AsRef<Path>) -> VulkanResult<()> {
        let (url, bytes) = read_file(path.as_ref())?;
        self.queue(url, &bytes)
    }

    /// Remove and return all pending images
    pub fn take_pending(&mut self) -> Vec<(String, ImageData)> {
        std::mem::take(&mut self.pending)
    }

    /// Number of images waiting for upload
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Store an uploaded texture, returning the one it replaces
    pub fn insert(&mut self, url: impl Into<String>, texture: Texture) -> Option<Texture> {
        self.textures.insert(url.into(), texture)
    }

    /// Remove a texture
    pub fn remove(&mut self, url: &str) -> VulkanResult<Texture> {
        self.textures
            .remove(url)
            .ok_or_else(|| VulkanError::ResourceNotFound(url.to_string()))
    }

    /// Undo an insert or remove of `url`
    ///
    /// `previous` is what the registry held under `url` before the change, if
    /// anything. Returns the texture it displaces so the caller decides when it is
    /// safe to destroy.
    pub fn restore(&mut self, url: &str, previous: Option<Texture>) -> Option<Texture> {
        restore_entry(&mut self.textures, url, previous)
    }

    /// Look up a texture
    pub fn get(&self, url: &str) -> VulkanResult<&Texture> {
        self.textures
            .get(url)
            .ok_or_else(|| VulkanError::ResourceNotFound(url.to_string()))
    }

    /// Whether a texture is loaded under `url`
    pub fn contains(&self, url: &str) -> bool {
        self.textures.contains_key(url)
    }

    /// Position of `url` in the sampler array
    pub fn index_of(&self, url: &str) -> Option<usize> {
        self.textures.keys().position(|key| key == url)
    }

    /// Number of loaded textures
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// Whether no texture is loaded
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Loaded urls in sampler-array order
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.textures.keys().map(String::as_str)
    }

    /// Descriptor infos in sampler-array order
    pub fn descriptor_image_infos(&self) -> Vec<vk::DescriptorImageInfo> {
        self.textures.values().map(Texture::descriptor_info).collect()
    }

    /// Destroy every loaded texture
    pub fn clear(&mut self) {
        self.textures.clear();
    }
}

impl Default for TextureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TextureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureRegistry")
            .field("textures", &self.textures.keys().collect::<Vec<_>>())
            .field("pending", &self.pending.iter().map(|(url, _)| url).collect::<Vec<_>>())
            .finish()
    }
}

/// Read a texture file, returning its url and contents
pub fn read_file(path: &Path) -> VulkanResult<(String, Vec<u8>)> {
    let url = path.to_string_lossy().into_owned();
    match std::fs::read(path) {
        Ok(bytes) => Ok((url, bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AssetError::NotFound(url).into()),
        Err(e) => Err(AssetError::Io(e).into()),
    }
}

fn restore_entry<T>(entries: &mut BTreeMap<String, T>, url: &str, previous: Option<T>) -> Option<T> {
    match previous {
        Some(previous) => entries.insert(url.to_string(), previous),
        None => entries.remove(url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Decodes any `.raw` url as a 1x1 pixel holding the first four bytes
    struct RawDecoder;

    impl ImageDecoder for RawDecoder {
        fn decode(&self, url: &str, bytes: &[u8]) -> Result<ImageData, AssetError> {
            if !url.ends_with(".raw") {
                return Err(AssetError::UnsupportedFormat(url.to_string()));
            }
            ImageData::from_rgba(1, 1, bytes.iter().copied().take(4).collect())
        }
    }

    #[test]
    fn test_missing_texture_lookup() {
        let registry = TextureRegistry::new();
        let err = registry.get("textures/missing.png").unwrap_err();
        assert_eq!(err.to_string(), "unable to locate resource with url: textures/missing.png");
        assert_eq!(registry.index_of("textures/missing.png"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_missing_texture() {
        let mut registry = TextureRegistry::new();
        assert!(matches!(registry.remove("nope.png"), Err(VulkanError::ResourceNotFound(_))));
    }

    #[test]
    fn test_queue_decodes_with_injected_decoder() {
        let mut registry = TextureRegistry::with_decoder(Box::new(RawDecoder));
        registry.queue("a.raw", &[1, 2, 3, 4]).unwrap();
        registry.queue("b.raw", &[5, 6, 7, 8]).unwrap();
        assert_eq!(registry.pending_count(), 2);

        let pending = registry.take_pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].0, "a.raw");
        assert_eq!(pending[1].1.data, vec![5, 6, 7, 8]);
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_requeue_replaces_pending_image() {
        let mut registry = TextureRegistry::with_decoder(Box::new(RawDecoder));
        registry.queue("a.raw", &[1, 1, 1, 1]).unwrap();
        registry.queue("a.raw", &[2, 2, 2, 2]).unwrap();

        let pending = registry.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1.data, vec![2, 2, 2, 2]);
    }

    #[test]
    fn test_unsupported_format_is_not_queued() {
        let mut registry = TextureRegistry::new();
        let err = registry.queue("logo.svg", b"<svg/>").unwrap_err();
        assert!(matches!(err, VulkanError::Asset(AssetError::UnsupportedFormat(_))));
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_queue_missing_file() {
        let mut registry = TextureRegistry::new();
        let err = registry.queue_file("definitely/not/here.png").unwrap_err();
        assert!(matches!(err, VulkanError::Asset(AssetError::NotFound(_))));
    }

    #[test]
    fn test_queue_file_uses_path_as_url() {
        let path = std::env::temp_dir().join(format!("frame_engine_registry_{}.raw", std::process::id()));
        std::fs::write(&path, [9, 8, 7, 6]).unwrap();

        let mut registry = TextureRegistry::with_decoder(Box::new(RawDecoder));
        registry.queue_file(&path).unwrap();
        let pending = registry.take_pending();
        assert_eq!(pending[0].0, path.to_string_lossy());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_restore_undoes_added_entry() {
        let mut entries: BTreeMap<String, u32> = BTreeMap::new();
        entries.insert("b.png".to_string(), 2);
        let previous = entries.insert("a.png".to_string(), 1);

        let displaced = restore_entry(&mut entries, "a.png", previous);
        assert_eq!(displaced, Some(1));
        assert_eq!(entries.keys().collect::<Vec<_>>(), ["b.png"]);
    }

    #[test]
    fn test_restore_undoes_replaced_entry() {
        let mut entries: BTreeMap<String, u32> = BTreeMap::new();
        entries.insert("a.png".to_string(), 1);
        let previous = entries.insert("a.png".to_string(), 10);

        let displaced = restore_entry(&mut entries, "a.png", previous);
        assert_eq!(displaced, Some(10));
        assert_eq!(entries.get("a.png"), Some(&1));
    }

    #[test]
    fn test_restore_undoes_removed_entry() {
        let mut entries: BTreeMap<String, u32> = BTreeMap::new();
        entries.insert("a.png".to_string(), 1);
        entries.insert("c.png".to_string(), 3);
        let removed = entries.remove("a.png");

        assert_eq!(restore_entry(&mut entries, "a.png", removed), None);
        assert_eq!(entries.keys().position(|key| key == "a.png"), Some(0));
        assert_eq!(entries.len(), 2);
    }
}
