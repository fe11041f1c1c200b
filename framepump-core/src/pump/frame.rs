//! Per-tick frame types: surface dimensions, frame descriptors and pixel views.

use std::fmt;

use thiserror::Error;

use crate::abi::BYTES_PER_PIXEL;

/// Surface size, fixed for a session.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Dimensions {
    width: u32,
    height: u32,
    byte_len: usize,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum DimensionsError {
    #[error("surface dimensions {width}x{height} are negative")]
    Negative { width: i32, height: i32 },
    #[error("surface dimensions {width}x{height} are empty")]
    Empty { width: i32, height: i32 },
    #[error("a {width}x{height} frame needs {byte_len} bytes, more than 32-bit linear memory holds")]
    ExceedsLinearMemory {
        width: i32,
        height: i32,
        byte_len: u64,
    },
}

impl Dimensions {
    /// Validate a width/height pair reported by a guest.
    ///
    /// The guest exports are `i32`, so negative values are rejected rather than reinterpreted.
    /// A frame has to fit in 32-bit linear memory, which also bounds the host's copy of it.
    pub fn new(width: i32, height: i32) -> Result<Self, DimensionsError> {
        if width < 0 || height < 0 {
            return Err(DimensionsError::Negative { width, height });
        }
        if width == 0 || height == 0 {
            return Err(DimensionsError::Empty { width, height });
        }
        let byte_len = width as u64 * height as u64 * BYTES_PER_PIXEL as u64;
        if byte_len > u32::MAX as u64 {
            return Err(DimensionsError::ExceedsLinearMemory {
                width,
                height,
                byte_len,
            });
        }

        Ok(Self {
            width: width as u32,
            height: height as u32,
            byte_len: byte_len as usize,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `width * height * 4`.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Bytes per row of an RGBA frame.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL as usize
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// What the pump asks the guest for on one tick.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameDescriptor {
    pub index: u32,
    /// Milliseconds since the previous presented frame; zero for the first one.
    pub elapsed_ms: f64,
}

/// Errors raised while obtaining a frame from a source.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("guest trapped while computing frame {index}")]
    Trap {
        index: u32,
        #[source]
        source: wasmtime::Error,
    },
    #[error("guest trapped while reporting its {what}")]
    Query {
        what: &'static str,
        #[source]
        source: wasmtime::Error,
    },
    #[error("frame region {ptr:#x}+{len} exceeds guest memory of {memory_size} bytes")]
    OutOfBounds {
        ptr: u32,
        len: usize,
        memory_size: usize,
    },
    #[error("frame holds {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Read-only RGBA window over guest memory, valid for a single tick.
///
/// The view borrows the source it came from, so it has to be presented (copied) before the
/// next frame can be requested.
#[derive(Copy, Clone, Debug)]
pub struct PixelView<'a> {
    dimensions: Dimensions,
    bytes: &'a [u8],
}

impl<'a> PixelView<'a> {
    /// Wrap `bytes`, which must hold exactly one frame.
    pub fn new(bytes: &'a [u8], dimensions: Dimensions) -> Result<Self, FrameError> {
        if bytes.len() != dimensions.byte_len() {
            return Err(FrameError::LengthMismatch {
                expected: dimensions.byte_len(),
                actual: bytes.len(),
            });
        }
        Ok(Self { dimensions, bytes })
    }

    /// Carve a frame out of linear memory starting at `ptr`.
    pub fn from_memory(
        memory: &'a [u8],
        ptr: u32,
        dimensions: Dimensions,
    ) -> Result<Self, FrameError> {
        let len = dimensions.byte_len();
        let out_of_bounds = || FrameError::OutOfBounds {
            ptr,
            len,
            memory_size: memory.len(),
        };
        let start = ptr as usize;
        let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
        let bytes = memory.get(start..end).ok_or_else(out_of_bounds)?;
        Ok(Self { dimensions, bytes })
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// RGBA texel at (x, y), if inside the frame.
    pub fn texel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.dimensions.width || y >= self.dimensions.height {
            return None;
        }
        let i = (y as usize * self.dimensions.width as usize + x as usize) * 4;
        let px = self.bytes.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Rows of `width * 4` bytes, top to bottom.
    pub fn rows(&self) -> std::slice::ChunksExact<'a, u8> {
        self.bytes.chunks_exact(self.dimensions.row_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_reject_empty_surfaces() {
        assert_eq!(
            Dimensions::new(0, 10),
            Err(DimensionsError::Empty {
                width: 0,
                height: 10
            })
        );
        assert!(Dimensions::new(10, 0).is_err());
        assert_eq!(Dimensions::new(4, 2).unwrap().byte_len(), 32);
    }

    #[test]
    fn dimensions_reject_negative_sizes() {
        assert_eq!(
            Dimensions::new(-1, 4),
            Err(DimensionsError::Negative {
                width: -1,
                height: 4
            })
        );
        assert!(matches!(
            Dimensions::new(4, i32::MIN),
            Err(DimensionsError::Negative { .. })
        ));
    }

    #[test]
    fn dimensions_must_fit_in_linear_memory() {
        assert_eq!(
            Dimensions::new(i32::MAX, 4),
            Err(DimensionsError::ExceedsLinearMemory {
                width: i32::MAX,
                height: 4,
                byte_len: i32::MAX as u64 * 16
            })
        );
        // 32768 * 32768 * 4 is exactly 4 GiB, one byte past the limit.
        assert!(Dimensions::new(32768, 32768).is_err());
        let largest = Dimensions::new(32767, 32768).unwrap();
        assert_eq!(largest.byte_len(), 32767 * 32768 * 4);
    }

    #[test]
    fn view_must_hold_exactly_one_frame() {
        let dims = Dimensions::new(4, 2).unwrap();
        assert!(PixelView::new(&[0u8; 32], dims).is_ok());
        assert!(matches!(
            PixelView::new(&[0u8; 31], dims),
            Err(FrameError::LengthMismatch {
                expected: 32,
                actual: 31
            })
        ));
    }

    #[test]
    fn view_from_memory_is_bounds_checked() {
        let dims = Dimensions::new(4, 2).unwrap();
        let memory = vec![7u8; 64];

        let view = PixelView::from_memory(&memory, 32, dims).unwrap();
        assert_eq!(view.len(), 32);

        assert!(matches!(
            PixelView::from_memory(&memory, 33, dims),
            Err(FrameError::OutOfBounds {
                ptr: 33,
                len: 32,
                memory_size: 64
            })
        ));
        assert!(PixelView::from_memory(&memory, u32::MAX, dims).is_err());
    }

    #[test]
    fn texels_are_addressed_row_major() {
        let dims = Dimensions::new(2, 2).unwrap();
        let bytes: Vec<u8> = (0..16).collect();
        let view = PixelView::new(&bytes, dims).unwrap();

        assert_eq!(view.texel(0, 0), Some([0, 1, 2, 3]));
        assert_eq!(view.texel(1, 0), Some([4, 5, 6, 7]));
        assert_eq!(view.texel(0, 1), Some([8, 9, 10, 11]));
        assert_eq!(view.texel(2, 0), None);
        assert_eq!(view.rows().count(), 2);
    }
}
