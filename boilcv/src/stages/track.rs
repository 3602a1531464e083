use artifacts::{ArtifactError, ArtifactKind, ContourTable, Table, TrackTable};
use vision::{track_contours, track_masks, video::MaskVideoReader};

use crate::Config;

/// Links objects across frames, from the contour table when there is one and
/// from the filled video otherwise.
pub(super) fn process(config: &Config, name: &str) -> anyhow::Result<String> {
    let store = config.store();
    let tracks: TrackTable = if store.exists(name, ArtifactKind::Contours) {
        let table = ContourTable::read_from(store.open(name, ArtifactKind::Contours)?)?;
        track_contours(&table, &config.track)?
    } else if store.exists(name, ArtifactKind::Filled) {
        log::debug!("{name}: no contours, tracking the filled video");
        track_masks(MaskVideoReader::new(store.open(name, ArtifactKind::Filled)?)?, &config.track)?
    } else {
        return Err(ArtifactError::MissingInput { name: name.to_string(), kind: ArtifactKind::Contours }.into());
    };

    let mut out = store.create(name, ArtifactKind::Tracks)?;
    tracks.write_to(&mut out)?;
    out.commit()?;

    Ok(format!("{} tracks over {} observations", tracks.track_ids().len(), tracks.len()))
}
