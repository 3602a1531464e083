use std::path::Path;

use anyhow::Context;
use artifacts::{ArtifactKind, AttrValue, Attrs};
use cine::{Cine, MetaValue};
use nalgebra::DMatrix;
use vision::{
    video::{gray_schema, GrayVideoWriter},
    VideoShape,
};

use crate::Config;

fn header(cine: &Cine, name: &str, source: &Path) -> Attrs {
    let mut header: Attrs = cine
        .metadata()
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                MetaValue::Int(v) => AttrValue::Int(v),
                MetaValue::Float(v) => AttrValue::Float(v),
                MetaValue::Text(v) => AttrValue::Text(v),
            };
            (key, value)
        })
        .collect();
    header.insert("name".into(), AttrValue::Text(name.into()));
    if let Some(file) = source.file_name() {
        header.insert("source".into(), AttrValue::Text(file.to_string_lossy().into_owned()));
    }
    header
}

/// Converts the configured frame window of a CINE into a gray video.
pub(super) fn process(config: &Config, name: &str, source: &Path) -> anyhow::Result<String> {
    let cine = Cine::open(source).with_context(|| format!("Failed to open {}", source.display()))?;
    let window = cine.window(config.start_frame, config.num_frames)?;
    let (height, width) = (cine.height(), cine.width());
    log::debug!(
        "{name}: {}x{} at {} bits, frames {}..{} of {}",
        width,
        height,
        cine.bit_depth(),
        window.start,
        window.end,
        cine.frame_count()
    );

    let utc_nanos = cine
        .timestamps()
        .get(window.clone())
        .context("Fewer timestamps than frames")?
        .iter()
        .map(|t| t.timestamp_nanos_opt().with_context(|| format!("Timestamp {t} out of range")))
        .collect::<anyhow::Result<Vec<i64>>>()?;
    let shape = VideoShape::new(window.len(), height, width);
    let schema = gray_schema(shape, cine.bit_depth(), utc_nanos, header(&cine, name, source));

    let store = config.store();
    let mut out = store.create(name, ArtifactKind::Gray)?;
    let mut writer = GrayVideoWriter::new(&mut out, &schema)?;
    for index in window.clone() {
        let pixels = cine.read_frame(index)?;
        writer.write_frame(&DMatrix::from_row_slice(height, width, &pixels))?;
    }
    writer.finish()?;
    out.commit()?;

    Ok(format!("{} frames ingested", window.len()))
}
