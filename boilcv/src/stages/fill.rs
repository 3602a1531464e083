use artifacts::{ArtifactKind, ContourTable, Table};
use vision::{
    filled_frames,
    video::{mask_schema, video_shape, MaskVideoReader, MaskVideoWriter},
};

use crate::{
    media::{warn_on_failure, MediaWriter},
    Config,
};

/// Rasterizes the stored contours back into a filled mask video shaped like
/// the binarized one.
pub(super) fn process(config: &Config, name: &str) -> anyhow::Result<String> {
    let store = config.store();
    let table = ContourTable::read_from(store.open(name, ArtifactKind::Contours)?)?;
    let source = MaskVideoReader::new(store.open(name, ArtifactKind::Binarized)?)?.schema().clone();
    let shape = video_shape(&source)?;
    table.validate(shape.frames, shape.height, shape.width)?;

    let mut out = store.create(name, ArtifactKind::Filled)?;
    let mut writer = MaskVideoWriter::new(&mut out, &mask_schema(&source, shape))?;
    let mut first = None;
    for mask in filled_frames(&table, shape) {
        let mask = mask?;
        writer.write_frame(&mask)?;
        if first.is_none() {
            first = Some(mask);
        }
    }
    writer.finish()?;
    out.commit()?;

    if let Some(mask) = first {
        warn_on_failure(name, "filled.png", MediaWriter::new(config, name).mask("filled.png", &mask));
    }

    Ok(format!("{} contours filled over {} frames", table.contour_count(), shape.frames))
}
