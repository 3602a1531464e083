use std::fs;

use anyhow::{bail, Context};
use opencv::{core::Vector, imgcodecs};
use vision::{
    preprocess::scale_to_8bit,
    utils::{dmatrix_to_mat, mask_to_mat},
    GrayFrame, Mask,
};

use crate::Config;

/// Writes PNG exports of intermediate images under `media/<video>/` when
/// `WRITE` is on. Does nothing otherwise.
pub struct MediaWriter<'a> {
    config: &'a Config,
    name: &'a str,
}

impl<'a> MediaWriter<'a> {
    pub fn new(config: &'a Config, name: &'a str) -> Self {
        Self { config, name }
    }

    pub fn enabled(&self) -> bool {
        self.config.write_media
    }

    pub fn mask(&self, file: &str, mask: &Mask) -> anyhow::Result<()> {
        if !self.enabled() {
            return Ok(());
        }
        self.write(file, &mask_to_mat(mask)?)
    }

    pub fn gray(&self, file: &str, frame: &GrayFrame, bit_depth: u8) -> anyhow::Result<()> {
        if !self.enabled() {
            return Ok(());
        }
        self.write(file, &dmatrix_to_mat(&scale_to_8bit(frame, bit_depth)?)?)
    }

    fn write(&self, file: &str, img: &opencv::core::Mat) -> anyhow::Result<()> {
        let dir = self.config.media_dir(self.name);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(file);
        let Some(path_str) = path.to_str() else {
            bail!("Media path {} is not valid unicode", path.display());
        };

        if !imgcodecs::imwrite(path_str, img, &Vector::new())? {
            bail!("Failed to write {}", path.display());
        }
        log::debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// Logs a failed export of `what` instead of failing the stage that made it.
pub fn warn_on_failure(name: &str, what: &str, result: anyhow::Result<()>) {
    if let Err(e) = result {
        log::warn!("{name}: could not export {what}: {e:#}");
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use super::*;

    #[test]
    fn nothing_is_written_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path());

        MediaWriter::new(&config, "v").mask("roi.png", &DMatrix::from_element(4, 4, true)).unwrap();

        assert!(!config.media_dir("v").exists());
    }

    #[test]
    fn masks_are_exported_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config { write_media: true, ..Config::new(dir.path()) };

        MediaWriter::new(&config, "v").mask("roi.png", &DMatrix::from_fn(8, 8, |r, _| r < 4)).unwrap();
        MediaWriter::new(&config, "v").gray("max.png", &DMatrix::from_element(8, 8, 1000u16), 12).unwrap();

        assert!(config.media_dir("v").join("roi.png").is_file());
        assert!(config.media_dir("v").join("max.png").is_file());
    }

    #[test]
    fn blocked_media_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config { write_media: true, ..Config::new(dir.path()) };
        fs::create_dir_all(dir.path().join("media")).unwrap();
        fs::write(config.media_dir("v"), b"").unwrap();

        let result = MediaWriter::new(&config, "v").mask("roi.png", &DMatrix::from_element(4, 4, true));
        assert!(result.is_err());
        warn_on_failure("v", "roi.png", result);
    }
}
