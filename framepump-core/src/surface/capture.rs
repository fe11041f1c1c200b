//! PNG sequence capture: one RGBA image per presented frame.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::pump::{Dimensions, PixelView, PresentError, Surface};

#[derive(Debug)]
pub struct PngSequence {
    dir: PathBuf,
    dimensions: Option<Dimensions>,
    written: u64,
}

impl PngSequence {
    /// Frames land in `dir`, which is created on resize if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            dimensions: None,
            written: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Path of the `n`th written frame.
    pub fn frame_path(&self, n: u64) -> PathBuf {
        self.dir.join(format!("frame_{n:05}.png"))
    }
}

impl Surface for PngSequence {
    fn resize(&mut self, dimensions: Dimensions) -> Result<(), PresentError> {
        fs::create_dir_all(&self.dir)?;
        self.dimensions = Some(dimensions);
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

        // Encode next to the target and rename, so an interrupted run never leaves a
        // truncated frame under its final name.
        let path = self.frame_path(self.written);
        let partial = path.with_extension("png.partial");
        let file = BufWriter::new(File::create(&partial)?);
        let mut encoder = png::Encoder::new(file, surface.width(), surface.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(view.bytes())?;
        writer.finish()?;
        fs::rename(&partial, &path)?;

        tracing::trace!(path = %path.display(), "frame written");
        self.written += 1;
        Ok(())
    }
}
