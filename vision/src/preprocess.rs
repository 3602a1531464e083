use nalgebra::DMatrix;

use crate::{
    error::{check_dims, Result, VisionError},
    GrayFrame, Mask,
};

/// Fill used outside an empty ROI.
pub const BACKGROUND: u8 = u8::MAX;

/// Drops the low bits of a frame recorded at `bit_depth` so it fits 8 bits.
pub fn scale_to_8bit(frame: &GrayFrame, bit_depth: u8) -> Result<DMatrix<u8>> {
    if !(1..=16).contains(&bit_depth) {
        return Err(VisionError::InvalidParameter(format!("bit depth {bit_depth}")));
    }
    let shift = bit_depth.saturating_sub(8);
    let max = u16::MAX >> (16 - bit_depth);

    Ok(frame.map(|v| (v.min(max) >> shift) as u8))
}

/// Mean brightness inside `roi`, the level bubbles stand out against.
pub fn background_level(frame: &DMatrix<u8>, roi: &Mask) -> Result<u8> {
    check_dims("ROI", frame.shape(), roi.shape())?;
    let (sum, count) = frame
        .iter()
        .zip(roi.iter())
        .filter(|(_, inside)| **inside)
        .fold((0u64, 0u64), |(sum, count), (&v, _)| (sum + v as u64, count + 1));

    Ok(match count {
        0 => BACKGROUND,
        n => ((sum + n / 2) / n) as u8,
    })
}

/// Paints every pixel outside `roi` with `fill`.
pub fn apply_roi(frame: &DMatrix<u8>, roi: &Mask, fill: u8) -> Result<DMatrix<u8>> {
    check_dims("ROI", frame.shape(), roi.shape())?;
    Ok(frame.zip_map(roi, |v, inside| if inside { v } else { fill }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle_roi(n: usize) -> Mask {
        let c = n as f64 / 2.0;
        DMatrix::from_fn(n, n, |r, col| (r as f64 - c).hypot(col as f64 - c) < c - 1.0)
    }

    #[test]
    fn twelve_bit_frames_are_shifted() {
        let frame = DMatrix::from_row_slice(1, 3, &[0u16, 0x0ff0, 0x0fff]);
        let scaled = scale_to_8bit(&frame, 12).unwrap();
        assert_eq!(scaled.as_slice(), &[0, 0xff, 0xff]);

        let frame = DMatrix::from_row_slice(1, 2, &[7u16, 300]);
        assert_eq!(scale_to_8bit(&frame, 8).unwrap().as_slice(), &[7, 255]);
        assert!(scale_to_8bit(&frame, 0).is_err());
    }

    #[test]
    fn roi_is_idempotent() {
        let roi = circle_roi(12);
        let frame = DMatrix::from_fn(12, 12, |r, c| (r * 12 + c) as u8);

        let once = apply_roi(&frame, &roi, BACKGROUND).unwrap();
        let twice = apply_roi(&once, &roi, BACKGROUND).unwrap();

        assert_eq!(once, twice);
        assert_eq!(once[(0, 0)], BACKGROUND);
        assert_eq!(once[(6, 6)], frame[(6, 6)]);
    }

    #[test]
    fn roi_must_match_frame() {
        let err = apply_roi(&DMatrix::zeros(4, 4), &circle_roi(5), 0);
        assert!(matches!(err, Err(VisionError::ShapeMismatch(_))));
    }

    #[test]
    fn background_is_the_mean_inside() {
        let frame = DMatrix::from_row_slice(2, 2, &[10u8, 20, 31, 255]);
        let roi = DMatrix::from_row_slice(2, 2, &[true, true, true, false]);

        assert_eq!(background_level(&frame, &roi).unwrap(), 20);
        assert_eq!(background_level(&frame, &DMatrix::from_element(2, 2, false)).unwrap(), BACKGROUND);
    }
}
