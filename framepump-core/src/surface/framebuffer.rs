//! Opaque XRGB8888 framebuffer.
//!
//! libretro's 32bpp format is a native-endian `0x00RRGGBB` word per pixel. Guest alpha is
//! dropped: each present replaces the whole surface, nothing is blended.

use crate::pump::{Dimensions, PixelView, PresentError, Surface};

#[derive(Debug, Default)]
pub struct Framebuffer {
    dimensions: Option<Dimensions>,
    /// Native-endian `0x00RRGGBB` words, row-major.
    bytes: Vec<u8>,
    presented: u64,
}

impl Framebuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        self.dimensions
    }

    /// Pixels as `0x00RRGGBB` words, row-major.
    pub fn pixels(&self) -> impl Iterator<Item = u32> + '_ {
        self.bytes
            .chunks_exact(4)
            .map(|px| u32::from_ne_bytes([px[0], px[1], px[2], px[3]]))
    }

    /// Number of frames presented since the last resize.
    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// The framebuffer as bytes, ready for `RuntimeHandle::upload_video_frame`.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Surface for Framebuffer {
    fn resize(&mut self, dimensions: Dimensions) -> Result<(), PresentError> {
        self.bytes.clear();
        self.bytes.resize(dimensions.byte_len(), 0);
        self.dimensions = Some(dimensions);
        self.presented = 0;
        Ok(())
    }

    fn present(&mut self, view: &PixelView<'_>) -> Result<(), PresentError> {
        let surface = self.dimensions.ok_or(PresentError::Unsized)?;
        if view.dimensions() != surface {
            return Err(PresentError::DimensionMismatch {
                surface,
                frame: view.dimensions(),
            });
        }

        for (dst, src) in self
            .bytes
            .chunks_exact_mut(4)
            .zip(view.bytes().chunks_exact(4))
        {
            let xrgb = ((src[0] as u32) << 16) | ((src[1] as u32) << 8) | (src[2] as u32);
            dst.copy_from_slice(&xrgb.to_ne_bytes());
        }
        self.presented += 1;
        Ok(())
    }
}
