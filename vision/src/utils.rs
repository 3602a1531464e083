use nalgebra::DMatrix;
use opencv::{
    core::{Mat, Scalar, CV_8UC1},
    prelude::*,
};

use crate::{error::Result, Mask};

/// Copies a row-major 8-bit image into a single channel Mat.
pub fn dmatrix_to_mat(img: &DMatrix<u8>) -> Result<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(img.nrows() as i32, img.ncols() as i32, CV_8UC1, Scalar::all(0.0))?;
    let data = mat.data_bytes_mut()?;
    for (r, row) in img.row_iter().enumerate() {
        let offset = r * img.ncols();
        for (c, v) in row.iter().enumerate() {
            data[offset + c] = *v;
        }
    }

    Ok(mat)
}

pub fn mat_to_dmatrix(mat: &Mat) -> Result<DMatrix<u8>> {
    let (rows, cols) = (mat.rows() as usize, mat.cols() as usize);
    let mut res = DMatrix::zeros(rows, cols);

    for r in 0..rows {
        for c in 0..cols {
            res[(r, c)] = *mat.at_2d::<u8>(r as i32, c as i32)?;
        }
    }

    Ok(res)
}

/// Foreground becomes 255, background 0.
pub fn mask_to_mat(mask: &Mask) -> Result<Mat> {
    dmatrix_to_mat(&mask.map(|v| if v { 255 } else { 0 }))
}

pub fn mat_to_mask(mat: &Mat) -> Result<Mask> {
    Ok(mat_to_dmatrix(mat)?.map(|v| v != 0))
}
