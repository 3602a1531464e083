use opencv::{
    core::Mat,
    imgproc::{adaptive_threshold, ADAPTIVE_THRESH_MEAN_C, THRESH_BINARY_INV},
};

use crate::{
    error::{Result, VisionError},
    preprocess::{apply_roi, background_level, scale_to_8bit},
    utils::{dmatrix_to_mat, mat_to_mask},
    GrayFrame, Mask,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinarizeParams {
    /// Side of the square neighbourhood the local mean is taken over. Odd.
    pub block_size: i32,
    /// Subtracted from the local mean before comparing.
    pub offset: f64,
}

impl Default for BinarizeParams {
    fn default() -> Self {
        Self { block_size: 11, offset: 2.0 }
    }
}

impl BinarizeParams {
    pub fn validate(&self) -> Result<()> {
        if self.block_size < 3 || self.block_size % 2 == 0 {
            return Err(VisionError::InvalidParameter(format!(
                "block size must be odd and at least 3, got {}",
                self.block_size
            )));
        }
        Ok(())
    }
}

/// Binarizes gray frames against one ROI. Bubbles are darker than their
/// surroundings and come out as foreground.
///
/// Outside the ROI each frame is painted with its own background level, which
/// keeps the ROI edge from reading as a dark ring, and no foreground survives there.
pub struct Binarizer {
    roi: Mask,
    bit_depth: u8,
    params: BinarizeParams,
}

impl Binarizer {
    pub fn new(roi: Mask, bit_depth: u8, params: BinarizeParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { roi, bit_depth, params })
    }

    pub fn roi(&self) -> &Mask {
        &self.roi
    }

    pub fn process_frame(&self, frame: &GrayFrame) -> Result<Mask> {
        let scaled = scale_to_8bit(frame, self.bit_depth)?;
        let masked = apply_roi(&scaled, &self.roi, background_level(&scaled, &self.roi)?)?;

        let mut binary = Mat::default();
        adaptive_threshold(
            &dmatrix_to_mat(&masked)?,
            &mut binary,
            255.0,
            ADAPTIVE_THRESH_MEAN_C,
            THRESH_BINARY_INV,
            self.params.block_size,
            self.params.offset,
        )?;

        Ok(mat_to_mask(&binary)?.zip_map(&self.roi, |v, inside| v && inside))
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use super::*;

    fn bright_frame_with_dark_square() -> GrayFrame {
        DMatrix::from_fn(32, 32, |r, c| if (12..16).contains(&r) && (12..16).contains(&c) { 20 } else { 220 })
    }

    #[test]
    fn dark_spots_become_foreground() {
        let roi = DMatrix::from_element(32, 32, true);
        let binarizer = Binarizer::new(roi, 8, BinarizeParams::default()).unwrap();

        let mask = binarizer.process_frame(&bright_frame_with_dark_square()).unwrap();

        assert!(mask[(13, 13)]);
        assert!(!mask[(2, 2)]);
        assert!(!mask[(13, 25)]);
    }

    #[test]
    fn nothing_is_found_outside_the_roi() {
        let roi = DMatrix::from_fn(32, 32, |_, c| c < 8);
        let binarizer = Binarizer::new(roi, 8, BinarizeParams::default()).unwrap();

        let mask = binarizer.process_frame(&bright_frame_with_dark_square()).unwrap();

        assert!(mask.iter().all(|&v| !v));
    }

    #[test]
    fn roi_and_frame_sizes_must_agree() {
        let binarizer = Binarizer::new(DMatrix::from_element(8, 8, true), 8, BinarizeParams::default()).unwrap();
        let err = binarizer.process_frame(&DMatrix::zeros(8, 9));
        assert!(matches!(err, Err(VisionError::ShapeMismatch(_))));
    }

    #[test]
    fn even_block_sizes_are_rejected() {
        let params = BinarizeParams { block_size: 10, offset: 2.0 };
        assert!(Binarizer::new(DMatrix::from_element(4, 4, true), 8, params).is_err());
    }
}
