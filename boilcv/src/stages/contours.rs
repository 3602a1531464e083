use artifacts::{ArtifactKind, Table};
use vision::{video::MaskVideoReader, ContourExtractor};

use crate::Config;

pub(super) fn process(config: &Config, name: &str) -> anyhow::Result<String> {
    let store = config.store();
    let mut reader = MaskVideoReader::new(store.open(name, ArtifactKind::Binarized)?)?;
    let shape = reader.shape();

    let mut extractor = ContourExtractor::new();
    while let Some(mask) = reader.read_frame()? {
        extractor.push_frame(&mask)?;
    }
    let table = extractor.finish()?;
    table.validate(shape.frames, shape.height, shape.width)?;

    let mut out = store.create(name, ArtifactKind::Contours)?;
    table.write_to(&mut out)?;
    out.commit()?;

    Ok(format!("{} contours in {} frames", table.contour_count(), shape.frames))
}
