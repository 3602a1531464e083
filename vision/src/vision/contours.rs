use artifacts::ContourTable;
use opencv::{
    core::{Point, Vector},
    imgproc::{find_contours_def, CHAIN_APPROX_SIMPLE, RETR_EXTERNAL},
};

use crate::{error::Result, utils::mask_to_mat, Mask};

/// External contours of a frame's foreground as `(y, x)` vertices, in the
/// detector's order. Collinear runs are reduced to their end points.
pub fn find_frame_contours(mask: &Mask) -> Result<Vec<Vec<(i32, i32)>>> {
    if !mask.iter().any(|&v| v) {
        return Ok(Vec::new());
    }

    let mut contours: Vector<Vector<Point>> = Vector::new();
    find_contours_def(&mask_to_mat(mask)?, &mut contours, RETR_EXTERNAL, CHAIN_APPROX_SIMPLE)?;

    Ok(contours
        .iter()
        .map(|contour| contour.iter().map(|p| (p.y, p.x)).collect())
        .collect())
}

/// Accumulates the contour columns of consecutive frames and builds the
/// table once all frames are in.
#[derive(Debug, Default)]
pub struct ContourExtractor {
    frame: Vec<i32>,
    contour: Vec<i32>,
    ypx: Vec<i32>,
    xpx: Vec<i32>,
    frames: usize,
}

impl ContourExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the next frame and returns how many contours it had.
    pub fn push_frame(&mut self, mask: &Mask) -> Result<usize> {
        let contours = find_frame_contours(mask)?;
        let frame = self.frames as i32;

        for (i, vertices) in contours.iter().enumerate() {
            for &(y, x) in vertices {
                self.frame.push(frame);
                self.contour.push(i as i32);
                self.ypx.push(y);
                self.xpx.push(x);
            }
        }
        self.frames += 1;

        Ok(contours.len())
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn finish(self) -> Result<ContourTable> {
        Ok(ContourTable::from_columns(self.frame, self.contour, self.ypx, self.xpx)?)
    }
}
