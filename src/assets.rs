//! Image assets referenced by `<img>` nodes.
//!
//! Every image is loaded and decoded up front, before the first measurement,
//! because intrinsic sizes feed the layout. Sources that cannot be loaded are
//! skipped with a warning; the layout then uses explicit `width`/`height`
//! attributes or collapses the image.

use std::collections::HashMap;
use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use image::RgbaImage;

use crate::dom::{ContentNode, Tag};

/// A decoded image: the original encoded bytes (for PDF embedding) plus RGBA
/// pixels (for raster painting).
pub struct LoadedImage {
    pub bytes: Vec<u8>,
    pub pixels: RgbaImage,
}

impl LoadedImage {
    pub fn size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

/// Decoded images keyed by their `src` attribute.
#[derive(Default)]
pub struct AssetStore {
    images: HashMap<String, LoadedImage>,
    base_dir: Option<PathBuf>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative file sources against `dir`. Without a base directory
    /// only data URIs are loaded.
    pub fn with_base_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            images: HashMap::new(),
            base_dir: Some(dir.into()),
        }
    }

    /// Load every image referenced in `tree`. Returns how many are available.
    pub fn preload(&mut self, tree: &ContentNode) -> usize {
        let mut srcs = Vec::new();
        collect_image_srcs(tree, &mut srcs);
        for src in srcs {
            if self.images.contains_key(&src) {
                continue;
            }
            match self.load(&src) {
                Ok(img) => {
                    self.images.insert(src, img);
                }
                Err(e) => log::warn!("Skipping image: {e}"),
            }
        }
        self.images.len()
    }

    pub fn get(&self, src: &str) -> Option<&LoadedImage> {
        self.images.get(src)
    }

    pub fn intrinsic_size(&self, src: &str) -> Option<(u32, u32)> {
        self.get(src).map(LoadedImage::size)
    }

    fn load(&self, src: &str) -> Result<LoadedImage, String> {
        let bytes = if src.starts_with("data:") {
            parse_data_uri(src)?
        } else {
            let dir = self
                .base_dir
                .as_ref()
                .ok_or_else(|| format!("no base directory to resolve {}", preview(src)))?;
            let path = dir.join(src);
            std::fs::read(&path).map_err(|e| format!("{}: {e}", path.display()))?
        };
        let pixels = image::load_from_memory(&bytes)
            .map_err(|e| format!("decode error: {e}"))?
            .to_rgba8();
        Ok(LoadedImage { bytes, pixels })
    }
}

fn collect_image_srcs(node: &ContentNode, out: &mut Vec<String>) {
    match node {
        ContentNode::Element(e) | ContentNode::Leaf(e) => {
            if e.tag == Tag::Img {
                if let Some(src) = e.src() {
                    out.push(src.to_string());
                }
            }
            for child in &e.children {
                collect_image_srcs(child, out);
            }
        }
        ContentNode::Text(_) | ContentNode::Break => {}
    }
}

fn preview(src: &str) -> String {
    let cut: String = src.chars().take(80).collect();
    format!("{cut:?}")
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
pub fn parse_data_uri(src: &str) -> Result<Vec<u8>, String> {
    let rest = src
        .strip_prefix("data:")
        .ok_or_else(|| format!("not a data URI: {}", preview(src)))?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| "invalid data URI: missing `,` separator".to_string())?;
    if !header.contains(";base64") {
        return Err("only base64-encoded data URIs are supported".to_string());
    }
    BASE64_STD
        .decode(data.trim())
        .map_err(|e| format!("base64 decode error: {e}"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dom::parse_document;

    /// A PNG data URI of a solid `w`×`h` image.
    pub(crate) fn png_data_uri(w: u32, h: u32) -> String {
        let img = RgbaImage::from_pixel(w, h, image::Rgba([200, 30, 30, 255]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", BASE64_STD.encode(buf.into_inner()))
    }

    #[test]
    fn preload_decodes_data_uris() {
        let html = format!(r#"<p>x</p><img src="{}"><img src="missing.png">"#, png_data_uri(4, 3));
        let mut store = AssetStore::new();
        assert_eq!(store.preload(&parse_document(&html)), 1);
        assert!(store.intrinsic_size("missing.png").is_none());
    }

    #[test]
    fn rejects_non_base64_uri() {
        assert!(parse_data_uri("data:text/plain,hello").is_err());
        assert!(parse_data_uri("logo.png").is_err());
        assert_eq!(parse_data_uri("data:text/plain;base64,aGk=").unwrap(), b"hi");
    }
}
