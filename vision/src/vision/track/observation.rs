use std::f64::consts::PI;

use artifacts::{ContourRef, ContourTable};
use nalgebra::Vector2;
use opencv::imgproc::moments;

use crate::{error::Result, utils::mask_to_mat, vision::fill::fill_contour};

/// One object in one frame. The centroid is stored as `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub frame: i32,
    pub contour: i32,
    pub centroid: Vector2<f64>,
    pub area_px: f64,
}

impl Observation {
    pub fn new(frame: i32, contour: i32, y: f64, x: f64, area_px: f64) -> Self {
        Self { frame, contour, centroid: Vector2::new(x, y), area_px }
    }

    pub fn y(&self) -> f64 {
        self.centroid.y
    }

    pub fn x(&self) -> f64 {
        self.centroid.x
    }

    /// Diameter of the circle with the same area.
    pub fn diameter_px(&self) -> f64 {
        (4.0 * self.area_px / PI).sqrt()
    }

    pub fn distance(&self, other: &Observation) -> f64 {
        (self.centroid - other.centroid).norm()
    }
}

/// Centroid and area of the pixels a contour encloses, outline included.
pub fn observe(contour: &ContourRef<'_>) -> Result<Observation> {
    let (mask, (y0, x0)) = fill_contour(contour)?;
    let m = moments(&mask_to_mat(&mask)?, true)?;

    if m.m00 <= 0.0 {
        let n = contour.len().max(1) as f64;
        let y = contour.ypx.iter().map(|&v| v as f64).sum::<f64>() / n;
        let x = contour.xpx.iter().map(|&v| v as f64).sum::<f64>() / n;
        return Ok(Observation::new(contour.frame, contour.contour, y, x, 0.0));
    }

    Ok(Observation::new(
        contour.frame,
        contour.contour,
        y0 as f64 + m.m01 / m.m00,
        x0 as f64 + m.m10 / m.m00,
        m.m00,
    ))
}

/// One observation per contour, in table order.
pub fn observe_table(table: &ContourTable) -> Result<Vec<Observation>> {
    table.contours().map(|c| observe(&c)).collect()
}
