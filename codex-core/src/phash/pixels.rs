//! Addressable pixel grids.

use crate::error::{CodexError, Result};

/// A 2D grid of RGB samples.
///
/// Alpha, where present, is ignored by hashing.
pub trait PixelSource {
    /// Width and height in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// RGB sample at `(x, y)`. Callers stay within [`dimensions`](Self::dimensions).
    fn rgb(&self, x: u32, y: u32) -> [u8; 3];
}

/// Channel layout of a raw buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb,
    Rgba,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

/// A borrowed, row-major pixel buffer, e.g. canvas `ImageData`.
#[derive(Debug, Clone, Copy)]
pub struct RawPixels<'a> {
    width: u32,
    height: u32,
    layout: PixelLayout,
    data: &'a [u8],
}

impl<'a> RawPixels<'a> {
    pub fn new(width: u32, height: u32, layout: PixelLayout, data: &'a [u8]) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(layout.channels()))
            .ok_or_else(|| CodexError::InvalidPixelBuffer("dimensions overflow".into()))?;

        if data.len() != expected {
            return Err(CodexError::InvalidPixelBuffer(format!(
                "{width}x{height} {layout:?} needs {expected} bytes, got {}",
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    /// Interpret a tightly packed RGBA buffer.
    pub fn rgba(width: u32, height: u32, data: &'a [u8]) -> Result<Self> {
        Self::new(width, height, PixelLayout::Rgba, data)
    }
}

impl PixelSource for RawPixels<'_> {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let channels = self.layout.channels();
        let offset = (y as usize * self.width as usize + x as usize) * channels;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ]
    }
}

#[cfg(feature = "image")]
mod image_impl {
    use image::{GenericImageView, Pixel, RgbImage, RgbaImage};

    use super::PixelSource;

    impl PixelSource for RgbImage {
        fn dimensions(&self) -> (u32, u32) {
            GenericImageView::dimensions(self)
        }

        fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
            self.get_pixel(x, y).0
        }
    }

    impl PixelSource for RgbaImage {
        fn dimensions(&self) -> (u32, u32) {
            GenericImageView::dimensions(self)
        }

        fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
            self.get_pixel(x, y).to_rgb().0
        }
    }
}
