use artifacts::{ContourRef, ContourTable};
use nalgebra::DMatrix;
use opencv::{
    core::{Mat, Point, Scalar, Vector, CV_8UC1},
    imgproc::{fill_poly, polylines, LINE_8},
};

use crate::{error::Result, utils::mat_to_mask, Mask, VideoShape};

fn polygons<'a, 'b: 'a>(contours: impl IntoIterator<Item = &'a ContourRef<'b>>, offset: (i32, i32)) -> Vector<Vector<Point>> {
    contours
        .into_iter()
        .map(|c| c.points().map(|(y, x)| Point::new(x - offset.1, y - offset.0)).collect())
        .collect()
}

/// Paints polygon interiors and their outlines, so contours that degenerate to
/// a line or a point still cover their pixels.
pub(crate) fn paint(img: &mut Mat, polys: &Vector<Vector<Point>>) -> Result<()> {
    if polys.is_empty() {
        return Ok(());
    }
    let white = Scalar::all(255.0);
    fill_poly(img, polys, white, LINE_8, 0, Point::default())?;
    polylines(img, polys, true, white, 1, LINE_8, 0)?;
    Ok(())
}

/// Rasterizes the contours of one frame into a `height x width` mask.
pub fn fill_frame(contours: &[ContourRef<'_>], height: usize, width: usize) -> Result<Mask> {
    if contours.is_empty() {
        return Ok(DMatrix::from_element(height, width, false));
    }

    let mut img = Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC1, Scalar::all(0.0))?;
    paint(&mut img, &polygons(contours, (0, 0)))?;
    mat_to_mask(&img)
}

/// Filled masks for every frame of a video, frames without contours included.
/// The table must already be validated against `shape`.
pub fn filled_frames(table: &ContourTable, shape: VideoShape) -> impl Iterator<Item = Result<Mask>> + '_ {
    let mut contours = table.contours().peekable();
    (0..shape.frames).map(move |frame| {
        let mut current = Vec::new();
        while let Some(c) = contours.next_if(|c| c.frame as usize == frame) {
            current.push(c);
        }
        fill_frame(&current, shape.height, shape.width)
    })
}

/// Rasterizes a single contour into a mask covering its bounding box.
/// Returns the mask and the `(y, x)` of its top left pixel.
pub fn fill_contour(contour: &ContourRef<'_>) -> Result<(Mask, (i32, i32))> {
    let y0 = contour.ypx.iter().copied().min().unwrap_or(0);
    let x0 = contour.xpx.iter().copied().min().unwrap_or(0);
    let y1 = contour.ypx.iter().copied().max().unwrap_or(0);
    let x1 = contour.xpx.iter().copied().max().unwrap_or(0);

    let mut img = Mat::new_rows_cols_with_default(y1 - y0 + 1, x1 - x0 + 1, CV_8UC1, Scalar::all(0.0))?;
    paint(&mut img, &polygons([contour], (y0, x0)))?;
    Ok((mat_to_mask(&img)?, (y0, x0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::contours::ContourExtractor;

    fn square_mask() -> Mask {
        DMatrix::from_fn(16, 16, |r, c| (6..10).contains(&r) && (6..10).contains(&c))
    }

    #[test]
    fn square_fills_back_exactly() {
        let mut extractor = ContourExtractor::new();
        extractor.push_frame(&square_mask()).unwrap();
        let table = extractor.finish().unwrap();

        let filled: Vec<Mask> = filled_frames(&table, VideoShape::new(1, 16, 16)).collect::<Result<_>>().unwrap();

        assert_eq!(filled, vec![square_mask()]);
    }

    #[test]
    fn empty_table_fills_blank_frames() {
        let table = ContourTable::default();
        let filled: Vec<Mask> = filled_frames(&table, VideoShape::new(2, 16, 16)).collect::<Result<_>>().unwrap();

        assert_eq!(filled.len(), 2);
        assert!(filled.iter().all(|f| f.shape() == (16, 16) && f.iter().all(|&v| !v)));
    }

    #[test]
    fn frames_without_contours_stay_blank() {
        let table = ContourTable::from_columns(vec![1, 1, 1, 1], vec![0; 4], vec![2, 4, 4, 2], vec![2, 2, 4, 4]).unwrap();
        let filled: Vec<Mask> = filled_frames(&table, VideoShape::new(3, 8, 8)).collect::<Result<_>>().unwrap();

        assert!(filled[0].iter().all(|&v| !v));
        assert_eq!(filled[1].iter().filter(|&&v| v).count(), 9);
        assert!(filled[2].iter().all(|&v| !v));
    }

    #[test]
    fn degenerate_contours_cover_their_pixels() {
        // A horizontal line and a single point
        let table = ContourTable::from_columns(vec![0, 0, 0], vec![0, 0, 1], vec![3, 3, 6], vec![1, 5, 6]).unwrap();
        let filled = filled_frames(&table, VideoShape::new(1, 8, 8)).next().unwrap().unwrap();

        assert!((1..=5).all(|x| filled[(3, x)]));
        assert!(filled[(6, 6)]);
        assert_eq!(filled.iter().filter(|&&v| v).count(), 6);
    }

    #[test]
    fn single_contour_fills_its_box() {
        let table = ContourTable::from_columns(vec![0; 4], vec![0; 4], vec![6, 9, 9, 6], vec![6, 6, 9, 9]).unwrap();
        let contour = table.contours().next().unwrap();

        let (mask, origin) = fill_contour(&contour).unwrap();

        assert_eq!(origin, (6, 6));
        assert_eq!(mask.shape(), (4, 4));
        assert!(mask.iter().all(|&v| v));
    }
}
