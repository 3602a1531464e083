//! Bit packing of boolean frames along the x axis.
//!
//! Byte `b` of a packed row holds pixels `8b..8b+8`, most significant bit
//! first. Trailing bits of the last byte are zero and dropped on unpack.

use nalgebra::DMatrix;

use crate::{
    error::{check_dims, Result, VisionError},
    Mask, VideoShape,
};

pub fn packed_width(width: usize) -> usize {
    width.div_ceil(8)
}

/// Packs one frame into `height * packed_width(width)` row-major bytes.
pub fn pack_frame(mask: &Mask) -> Vec<u8> {
    let pw = packed_width(mask.ncols());
    let mut out = vec![0u8; mask.nrows() * pw];

    for (r, row) in mask.row_iter().enumerate() {
        for (x, &v) in row.iter().enumerate() {
            if v {
                out[r * pw + x / 8] |= 0x80 >> (x % 8);
            }
        }
    }

    out
}

pub fn unpack_frame(packed: &[u8], height: usize, width: usize) -> Result<Mask> {
    let pw = packed_width(width);
    if packed.len() != height * pw {
        return Err(VisionError::ShapeMismatch(format!(
            "{} packed bytes cannot hold a {height}x{width} frame",
            packed.len()
        )));
    }

    Ok(DMatrix::from_fn(height, width, |r, x| packed[r * pw + x / 8] & (0x80 >> (x % 8)) != 0))
}

/// A whole boolean video in packed form, `(frames, height, packed_width)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedVideo {
    pub shape: VideoShape,
    pub data: Vec<u8>,
}

impl PackedVideo {
    pub fn pack(frames: &[Mask]) -> Result<Self> {
        let (height, width) = frames.first().map(|f| f.shape()).unwrap_or((0, 0));
        let shape = VideoShape { frames: frames.len(), height, width };

        let mut data = Vec::with_capacity(shape.frames * height * packed_width(width));
        for frame in frames {
            check_dims("frame", (height, width), frame.shape())?;
            data.extend(pack_frame(frame));
        }

        Ok(Self { shape, data })
    }

    pub fn packed_shape(&self) -> (usize, usize, usize) {
        (self.shape.frames, self.shape.height, packed_width(self.shape.width))
    }

    pub fn unpack(&self) -> Result<Vec<Mask>> {
        let (frames, height, pw) = self.packed_shape();
        if self.data.len() != frames * height * pw {
            return Err(VisionError::ShapeMismatch(format!(
                "{} packed bytes for shape {frames}x{height}x{pw}",
                self.data.len()
            )));
        }
        if height * pw == 0 {
            return Ok(vec![DMatrix::from_element(height, self.shape.width, false); frames]);
        }

        self.data
            .chunks_exact(height * pw)
            .map(|chunk| unpack_frame(chunk, height, self.shape.width))
            .collect()
    }
}
