use artifacts::ArtifactKind;
use vision::{
    video::{mask_schema, read_roi, GrayVideoReader, MaskVideoWriter},
    Binarizer,
};

use crate::{
    media::{warn_on_failure, MediaWriter},
    preview::preview_mask,
    Config,
};

pub(super) fn process(config: &Config, name: &str) -> anyhow::Result<String> {
    let store = config.store();
    let (_, roi) = read_roi(store.open(name, ArtifactKind::Roi)?)?;
    let mut reader = GrayVideoReader::new(store.open(name, ArtifactKind::Gray)?)?;
    let shape = reader.shape();
    let binarizer = Binarizer::new(roi, reader.bit_depth(), config.binarize)?;

    let mut out = store.create(name, ArtifactKind::Binarized)?;
    let mut writer = MaskVideoWriter::new(&mut out, &mask_schema(reader.schema(), shape))?;
    let mut foreground = 0;
    let mut index = 0;
    let mut first = None;
    while let Some(frame) = reader.read_frame()? {
        let mask = binarizer.process_frame(&frame)?;
        if first.is_none() {
            first = Some(mask.clone());
        }
        foreground += mask.iter().filter(|&&v| v).count();
        writer.write_frame(&mask)?;
        index += 1;
    }
    writer.finish()?;
    out.commit()?;

    if let Some(mask) = first {
        let export = MediaWriter::new(config, name).mask("binarized.png", &mask);
        warn_on_failure(name, "binarized.png", export);
        let preview = preview_mask(config, &format!("{name} binarized"), &mask);
        warn_on_failure(name, "binarized preview", preview);
    }

    Ok(format!("{index} frames binarized, {foreground} foreground pixels"))
}
