pub mod binarize;
pub mod contours;
pub mod fill;
pub mod roi;
pub mod track;
