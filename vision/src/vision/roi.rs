use nalgebra::DMatrix;
use opencv::{
    core::{copy_make_border, Mat, Point, Scalar, Size, BORDER_CONSTANT},
    imgproc::{erode_def, flood_fill_def, get_structuring_element_def, morphology_ex_def, threshold, MORPH_CLOSE, MORPH_ELLIPSE, THRESH_BINARY, THRESH_OTSU},
};

use crate::{
    error::{check_dims, Result, VisionError},
    preprocess::scale_to_8bit,
    utils::{dmatrix_to_mat, mask_to_mat, mat_to_dmatrix, mat_to_mask},
    GrayFrame, Mask,
};

const FLOODED: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiParams {
    /// Radius of the elliptical kernel closing holes in the flooded region.
    pub close_radius: usize,
    /// Radius of the kernel shrinking the region away from the chamber wall.
    pub erode_radius: usize,
}

impl Default for RoiParams {
    fn default() -> Self {
        Self { close_radius: 5, erode_radius: 3 }
    }
}

/// Per-pixel maximum over the frames of a video, accumulated one frame at a time.
pub struct MaxProjection {
    max: Option<GrayFrame>,
}

impl MaxProjection {
    pub fn new() -> Self {
        Self { max: None }
    }

    pub fn push(&mut self, frame: &GrayFrame) -> Result<()> {
        match &mut self.max {
            Some(max) => {
                check_dims("frame", max.shape(), frame.shape())?;
                max.iter_mut().zip(frame.iter()).for_each(|(m, &v)| *m = (*m).max(v));
            }
            None => self.max = Some(frame.clone()),
        }
        Ok(())
    }

    pub fn finish(self) -> Result<GrayFrame> {
        self.max
            .ok_or_else(|| VisionError::InvalidParameter("maximum projection of a video without frames".into()))
    }
}

impl Default for MaxProjection {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives the ROI from a video's maximum projection.
///
/// The projection is Otsu thresholded and the connected region under the image
/// center is flooded. That region is closed and eroded on a background padded
/// copy, so neither operation sees the image border.
pub fn extract_roi(max_projection: &GrayFrame, bit_depth: u8, params: &RoiParams) -> Result<Mask> {
    let (height, width) = max_projection.shape();
    if height == 0 || width == 0 {
        return Err(VisionError::InvalidParameter("empty maximum projection".into()));
    }

    let img = dmatrix_to_mat(&scale_to_8bit(max_projection, bit_depth)?)?;
    let mut thresholded = Mat::default();
    threshold(&img, &mut thresholded, 0.0, 255.0, THRESH_BINARY | THRESH_OTSU)?;

    let center = Point::new((width / 2) as i32, (height / 2) as i32);
    flood_fill_def(&mut thresholded, center, Scalar::all(FLOODED as f64))?;
    let interior: Mask = mat_to_dmatrix(&thresholded)?.map(|v| v == FLOODED);
    log::debug!("Flooded {} of {} pixels", interior.iter().filter(|&&v| v).count(), height * width);

    let pad = (params.close_radius + params.erode_radius + 1) as i32;
    let mut padded = Mat::default();
    copy_make_border(&mask_to_mat(&interior)?, &mut padded, pad, pad, pad, pad, BORDER_CONSTANT, Scalar::all(0.0))?;

    let mut closed = Mat::default();
    morphology_ex_def(&padded, &mut closed, MORPH_CLOSE, &ellipse(params.close_radius)?)?;
    let mut eroded = Mat::default();
    erode_def(&closed, &mut eroded, &ellipse(params.erode_radius)?)?;

    let pad = pad as usize;
    let roi: DMatrix<bool> = mat_to_mask(&eroded)?.view((pad, pad), (height, width)).into_owned();
    Ok(roi)
}

fn ellipse(radius: usize) -> Result<Mat> {
    let side = 2 * radius as i32 + 1;
    Ok(get_structuring_element_def(MORPH_ELLIPSE, Size::new(side, side))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bright disc of radius 20 on a dark 64x64 frame, with a little dark speck
    /// inside that the closing has to remove.
    fn chamber(frame: usize) -> GrayFrame {
        DMatrix::from_fn(64, 64, |r, c| {
            let d = (r as f64 - 32.0).hypot(c as f64 - 32.0);
            if d < 20.0 && !(r == 40 && c == 30) {
                3000 + (frame as u16 * 7 + r as u16) % 50
            } else {
                200
            }
        })
    }

    fn projection() -> GrayFrame {
        let mut max = MaxProjection::new();
        for f in 0..4 {
            max.push(&chamber(f)).unwrap();
        }
        max.finish().unwrap()
    }

    #[test]
    fn roi_is_the_eroded_disc() {
        let roi = extract_roi(&projection(), 12, &RoiParams::default()).unwrap();

        assert_eq!(roi.shape(), (64, 64));
        assert!(roi[(32, 32)]);
        assert!(roi[(40, 30)]);
        // Wall pixels fall inside the disc but outside the eroded region
        assert!(!roi[(32, 51)]);
        assert!(!roi[(0, 0)]);
        assert!(!roi[(32, 60)]);
    }

    #[test]
    fn roi_is_deterministic() {
        let first = extract_roi(&projection(), 12, &RoiParams::default()).unwrap();
        for _ in 0..10 {
            assert_eq!(extract_roi(&projection(), 12, &RoiParams::default()).unwrap(), first);
        }
    }

    #[test]
    fn projection_needs_frames_of_one_size() {
        let mut max = MaxProjection::new();
        max.push(&DMatrix::zeros(4, 4)).unwrap();
        assert!(matches!(max.push(&DMatrix::zeros(4, 5)), Err(VisionError::ShapeMismatch(_))));
        assert!(MaxProjection::new().finish().is_err());
    }
}
