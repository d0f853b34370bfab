//! Texture data and a filename-keyed cache.
//! Decoding goes through `image` (PNG, JPEG) into RGBA8.

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};

use crate::mesh::TextureSource;

/// Texture data in CPU-friendly format before GPU upload.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Supported texture formats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TextureFormat {
    Rgba8,
}

impl TextureData {
    /// 1x1 texture of a single RGBA8 color.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            data: rgba.to_vec(),
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8,
        }
    }

    /// Engine default for diffuse and specular slots.
    pub fn white() -> Self {
        Self::solid([255, 255, 255, 255])
    }

    /// Engine default for normal-map slots: +Z in tangent space.
    pub fn flat_normal() -> Self {
        Self::solid([127, 127, 255, 0])
    }

    /// Decode an encoded image (PNG or JPEG) into RGBA8.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes).context("Failed to decode image")?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let data = rgba.into_raw();

        log::debug!("Decoded texture {}x{} with {} bytes", width, height, data.len());

        Ok(Self {
            data,
            width,
            height,
            format: TextureFormat::Rgba8,
        })
    }

    /// Get the number of bytes per pixel for the format.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self.format {
            TextureFormat::Rgba8 => 4,
        }
    }

    /// Check if the texture data is valid.
    pub fn is_valid(&self) -> bool {
        let expected_size =
            u64::from(self.width) * u64::from(self.height) * u64::from(self.bytes_per_pixel());
        self.data.len() as u64 == expected_size && self.width > 0 && self.height > 0
    }
}

/// Textures realized on first use, one entry per distinct file name.
pub struct TextureCache {
    white: Arc<TextureData>,
    flat_normal: Arc<TextureData>,
    files: HashMap<String, Arc<TextureData>>,
}

impl Default for TextureCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureCache {
    pub fn new() -> Self {
        Self {
            white: Arc::new(TextureData::white()),
            flat_normal: Arc::new(TextureData::flat_normal()),
            files: HashMap::new(),
        }
    }

    /// Number of distinct files loaded so far.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Return the cached texture for `name`, calling `load` for its encoded
    /// bytes only the first time the name is seen.
    pub fn get_or_load(
        &mut self,
        name: &str,
        load: impl FnOnce(&str) -> Result<Vec<u8>>,
    ) -> Result<Arc<TextureData>> {
        if let Some(texture) = self.files.get(name) {
            return Ok(Arc::clone(texture));
        }
        let bytes = load(name)?;
        let texture = Arc::new(
            TextureData::decode(&bytes).with_context(|| format!("Texture '{name}'"))?,
        );
        log::info!("Loaded texture '{}' ({}x{})", name, texture.width, texture.height);
        self.files.insert(name.to_string(), Arc::clone(&texture));
        Ok(texture)
    }

    /// Resolve a material slot. A file that fails to load is logged and
    /// replaced by `fallback` so the model still renders.
    pub fn resolve(
        &mut self,
        source: &TextureSource,
        fallback: &TextureSource,
        load: impl FnOnce(&str) -> Result<Vec<u8>>,
    ) -> Arc<TextureData> {
        match source {
            TextureSource::White | TextureSource::FlatNormal => self.builtin(source),
            TextureSource::File(name) => match self.get_or_load(name, load) {
                Ok(texture) => texture,
                Err(err) => {
                    log::warn!("Using default for texture '{}': {:#}", name, err);
                    self.builtin(fallback)
                }
            },
        }
    }

    fn builtin(&self, source: &TextureSource) -> Arc<TextureData> {
        match source {
            TextureSource::FlatNormal => Arc::clone(&self.flat_normal),
            TextureSource::White | TextureSource::File(_) => Arc::clone(&self.white),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn defaults_are_valid() {
        assert!(TextureData::white().is_valid());
        assert!(TextureData::flat_normal().is_valid());
    }

    #[test]
    fn mismatched_size_is_invalid() {
        let mut tex = TextureData::solid([0; 4]);
        tex.width = 2;
        tex.height = 2;
        assert!(!tex.is_valid());
        tex.data = vec![0; 16];
        assert!(tex.is_valid());
    }

    #[test]
    fn huge_dimensions_do_not_wrap() {
        // 65536 * 65536 * 4 wraps to 0 in u32.
        let tex = TextureData {
            data: Vec::new(),
            width: 65536,
            height: 65536,
            format: TextureFormat::Rgba8,
        };
        assert!(!tex.is_valid());
    }

    #[test]
    fn decode_png() {
        let tex = TextureData::decode(&png_bytes()).unwrap();
        assert_eq!((tex.width, tex.height), (2, 3));
        assert!(tex.is_valid());
        assert_eq!(&tex.data[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn cache_loads_each_name_once() {
        let calls = Cell::new(0);
        let mut cache = TextureCache::new();
        let load = |_: &str| -> Result<Vec<u8>> {
            calls.set(calls.get() + 1);
            Ok(png_bytes())
        };
        let a = cache.get_or_load("wood.png", load).unwrap();
        let b = cache.get_or_load("wood.png", load).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_file_falls_back() {
        let mut cache = TextureCache::new();
        let tex = cache.resolve(
            &TextureSource::File("missing.png".to_string()),
            &TextureSource::FlatNormal,
            |_| anyhow::bail!("not found"),
        );
        assert_eq!(*tex, TextureData::flat_normal());
        assert!(!cache.contains("missing.png"));
    }
}
