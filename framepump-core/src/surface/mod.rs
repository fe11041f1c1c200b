//! Presentation targets for the frame pump.
//!
//! - [`Framebuffer`]: host-owned XRGB8888 pixels, uploaded to a libretro frontend each run.
//! - [`PngSequence`]: writes every presented frame to `frame_NNNNN.png` in a directory.

mod capture;
mod framebuffer;

pub use capture::PngSequence;
pub use framebuffer::Framebuffer;
