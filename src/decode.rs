//! Image decoding
//!
//! Turns a file into a row-major float pixel buffer. Everything downstream
//! treats the decoder as opaque, so hosts can swap in their own codecs.

use crate::error::{IteratorError, Result};
use image::DynamicImage;
use std::path::Path;

/// Decoded pixels, channel order RGB or RGBA, samples in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// 3 for RGB, 4 for RGBA
    pub channels: u8,
    pub samples: Vec<f32>,
}

impl DecodedImage {
    pub fn has_alpha(&self) -> bool {
        self.channels == 4
    }

    /// Samples of the pixel at `(x, y)`, if inside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[f32]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channels = self.channels as usize;
        let start = (y as usize * self.width as usize + x as usize) * channels;
        self.samples.get(start..start + channels)
    }

    fn from_dynamic(image: DynamicImage, allow_transparency: bool) -> Self {
        let (width, height) = (image.width(), image.height());
        if allow_transparency && image.color().has_alpha() {
            Self {
                width,
                height,
                channels: 4,
                samples: image.to_rgba32f().into_raw(),
            }
        } else {
            Self {
                width,
                height,
                channels: 3,
                samples: image.to_rgb32f().into_raw(),
            }
        }
    }
}

/// Decode capability.
pub trait Decoder: Send + Sync {
    /// Decode one file. With `allow_transparency` false the alpha channel is
    /// dropped; without an alpha channel in the source the result is RGB.
    fn decode(&self, path: &Path, allow_transparency: bool) -> Result<DecodedImage>;
}

/// Decoder for the raster formats the `image` crate handles.
///
/// The format is sniffed from the file content, not the extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageFileDecoder;

impl Decoder for ImageFileDecoder {
    fn decode(&self, path: &Path, allow_transparency: bool) -> Result<DecodedImage> {
        let bytes = std::fs::read(path).map_err(|e| IteratorError::decode(path, e))?;
        let image = image::load_from_memory(&bytes).map_err(|e| IteratorError::decode(path, e))?;
        Ok(DecodedImage::from_dynamic(image, allow_transparency))
    }
}
