mod error;
pub mod packing;
pub mod preprocess;
pub mod utils;
pub mod video;
mod vision;

use nalgebra::DMatrix;

pub use error::{Result, VisionError};
pub use packing::PackedVideo;
pub use video::VideoShape;
pub use vision::{
    binarize::{BinarizeParams, Binarizer},
    contours::{find_frame_contours, ContourExtractor},
    fill::{fill_contour, fill_frame, filled_frames},
    roi::{extract_roi, MaxProjection, RoiParams},
    track::{observation::Observation, track_contours, track_masks, track_observations, TrackParams},
};

/// Gray intensities at the recording's bit depth, indexed `(ypx, xpx)`.
pub type GrayFrame = DMatrix<u16>;

/// Boolean frame, `true` for foreground.
pub type Mask = DMatrix<bool>;
