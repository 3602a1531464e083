pub mod filter;
pub mod linking;
pub mod observation;

use artifacts::{ContourTable, TrackRow, TrackTable};

use crate::{
    error::{Result, VisionError},
    vision::contours::ContourExtractor,
    Mask,
};
use filter::filter_short_tracks;
use linking::link;
use observation::{observe_table, Observation};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackParams {
    /// Largest centroid displacement between linked observations.
    pub max_displacement_px: f64,
    /// Missing frames a track may skip.
    pub max_gap_frames: usize,
    /// Tracks with fewer observations are dropped.
    pub min_track_len: usize,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self { max_displacement_px: 10.0, max_gap_frames: 1, min_track_len: 1 }
    }
}

impl TrackParams {
    pub fn validate(&self) -> Result<()> {
        if !self.max_displacement_px.is_finite() || self.max_displacement_px < 0.0 {
            return Err(VisionError::InvalidParameter(format!(
                "displacement radius {}",
                self.max_displacement_px
            )));
        }
        Ok(())
    }
}

pub fn track_observations(observations: &[Observation], params: &TrackParams) -> Result<TrackTable> {
    params.validate()?;
    let chains = link(observations, params);
    let ids = filter_short_tracks(&chains, params.min_track_len);

    let mut table = TrackTable::default();
    for (obs, id) in observations.iter().zip(ids) {
        let Some(track_id) = id else { continue };
        table.push(TrackRow {
            frame: obs.frame,
            contour: obs.contour,
            y: obs.y(),
            x: obs.x(),
            area_px: obs.area_px,
            diameter_px: obs.diameter_px(),
            track_id,
        });
    }

    log::debug!(
        "{} observations linked into {} chains, {} tracks kept",
        observations.len(),
        chains.iter().max().map_or(0, |c| c + 1),
        table.track_ids().len()
    );
    Ok(table)
}

pub fn track_contours(table: &ContourTable, params: &TrackParams) -> Result<TrackTable> {
    track_observations(&observe_table(table)?, params)
}

/// Tracks the objects of a filled mask video by re-extracting their contours.
pub fn track_masks(masks: impl IntoIterator<Item = Result<Mask>>, params: &TrackParams) -> Result<TrackTable> {
    let mut extractor = ContourExtractor::new();
    for mask in masks {
        extractor.push_frame(&mask?)?;
    }
    track_contours(&extractor.finish()?, params)
}
