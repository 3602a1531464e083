use artifacts::ArtifactKind;
use vision::{
    extract_roi,
    video::{roi_schema, write_roi, GrayVideoReader},
    MaxProjection,
};

use crate::{
    media::{warn_on_failure, MediaWriter},
    preview::preview_mask,
    Config,
};

/// Derives the region of interest from the maximum projection of the gray video.
pub(super) fn process(config: &Config, name: &str) -> anyhow::Result<String> {
    let store = config.store();
    let mut reader = GrayVideoReader::new(store.open(name, ArtifactKind::Gray)?)?;
    let bit_depth = reader.bit_depth();
    let schema = reader.schema().clone();

    let mut projection = MaxProjection::new();
    while let Some(frame) = reader.read_frame()? {
        projection.push(&frame)?;
    }
    let max = projection.finish()?;
    let roi = extract_roi(&max, bit_depth, &config.roi)?;

    let mut out = store.create(name, ArtifactKind::Roi)?;
    write_roi(&mut out, &roi_schema(&schema, roi.nrows(), roi.ncols()), &roi)?;
    out.commit()?;

    let media = MediaWriter::new(config, name);
    warn_on_failure(name, "max.png", media.gray("max.png", &max, bit_depth));
    warn_on_failure(name, "roi.png", media.mask("roi.png", &roi));
    warn_on_failure(name, "roi preview", preview_mask(config, &format!("{name} roi"), &roi));

    let inside = roi.iter().filter(|&&v| v).count();
    Ok(format!("ROI covers {inside} of {} pixels", roi.len()))
}
