use std::{env, path::PathBuf, str::FromStr};

use anyhow::Context;
use artifacts::ArtifactStore;
use vision::{BinarizeParams, RoiParams, TrackParams};

/// Everything a pipeline run depends on, passed explicitly to every stage.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_root: PathBuf,
    /// Recompute artifacts that already exist.
    pub reprocess: bool,
    pub debug: bool,
    /// Show intermediate images in a window.
    pub preview: bool,
    /// Export PNGs of intermediate images under `media/`.
    pub write_media: bool,
    /// Videos processed in parallel.
    pub jobs: usize,
    pub start_frame: usize,
    pub num_frames: Option<usize>,
    pub roi: RoiParams,
    pub binarize: BinarizeParams,
    pub track: TrackParams,
}

impl Config {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            reprocess: false,
            debug: false,
            preview: false,
            write_media: false,
            jobs: 1,
            start_frame: 0,
            num_frames: None,
            roi: RoiParams::default(),
            binarize: BinarizeParams::default(),
            track: TrackParams::default(),
        }
    }

    /// Loads the configuration from environment variables.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `BOILCV_DATA`             | `data`  |
    /// | `REPROCESS`               | off     |
    /// | `DEBUG`                   | off     |
    /// | `PREVIEW`                 | off     |
    /// | `WRITE`                   | off     |
    /// | `BOILCV_JOBS`             | `1`     |
    /// | `BOILCV_START_FRAME`      | `0`     |
    /// | `BOILCV_NUM_FRAMES`       | all     |
    /// | `BOILCV_BLOCK_SIZE`       | `11`    |
    /// | `BOILCV_THRESHOLD_OFFSET` | `2`     |
    /// | `BOILCV_ROI_CLOSE_RADIUS` | `5`     |
    /// | `BOILCV_ROI_ERODE_RADIUS` | `3`     |
    /// | `BOILCV_TRACK_RADIUS`     | `10`    |
    /// | `BOILCV_TRACK_GAP`        | `1`     |
    /// | `BOILCV_MIN_TRACK_LEN`    | `1`     |
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::new(lookup("BOILCV_DATA").unwrap_or_else(|| "data".into()));
        let flag = |key: &str| lookup(key).is_some_and(|v| truthy(&v));

        let config = Self {
            reprocess: flag("REPROCESS"),
            debug: flag("DEBUG"),
            preview: flag("PREVIEW"),
            write_media: flag("WRITE"),
            jobs: parse(&lookup, "BOILCV_JOBS")?.unwrap_or(defaults.jobs).max(1),
            start_frame: parse(&lookup, "BOILCV_START_FRAME")?.unwrap_or(defaults.start_frame),
            num_frames: parse(&lookup, "BOILCV_NUM_FRAMES")?,
            roi: RoiParams {
                close_radius: parse(&lookup, "BOILCV_ROI_CLOSE_RADIUS")?.unwrap_or(defaults.roi.close_radius),
                erode_radius: parse(&lookup, "BOILCV_ROI_ERODE_RADIUS")?.unwrap_or(defaults.roi.erode_radius),
            },
            binarize: BinarizeParams {
                block_size: parse(&lookup, "BOILCV_BLOCK_SIZE")?.unwrap_or(defaults.binarize.block_size),
                offset: parse(&lookup, "BOILCV_THRESHOLD_OFFSET")?.unwrap_or(defaults.binarize.offset),
            },
            track: TrackParams {
                max_displacement_px: parse(&lookup, "BOILCV_TRACK_RADIUS")?.unwrap_or(defaults.track.max_displacement_px),
                max_gap_frames: parse(&lookup, "BOILCV_TRACK_GAP")?.unwrap_or(defaults.track.max_gap_frames),
                min_track_len: parse(&lookup, "BOILCV_MIN_TRACK_LEN")?.unwrap_or(defaults.track.min_track_len),
            },
            ..defaults
        };

        config.binarize.validate()?;
        config.track.validate()?;
        Ok(config)
    }

    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.data_root)
    }

    pub fn media_dir(&self, name: &str) -> PathBuf {
        self.data_root.join("media").join(name)
    }
}

/// `1`, `true`, `yes` and `on` in any case.
pub fn truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|v| v.trim().parse::<T>().with_context(|| format!("{key} has invalid value '{v}'")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        let config = load(&[]).unwrap();

        assert_eq!(config.data_root, PathBuf::from("data"));
        assert!(!config.reprocess && !config.debug && !config.preview && !config.write_media);
        assert_eq!(config.jobs, 1);
        assert_eq!(config.num_frames, None);
        assert_eq!(config.binarize, BinarizeParams::default());
        assert_eq!(config.track, TrackParams::default());
    }

    #[test]
    fn flags_are_case_insensitive() {
        let config = load(&[("DEBUG", "TRUE"), ("PREVIEW", "Yes"), ("WRITE", "0"), ("REPROCESS", "on")]).unwrap();
        assert!(config.debug && config.preview && config.reprocess);
        assert!(!config.write_media);
    }

    #[test]
    fn numbers_are_parsed() {
        let config = load(&[
            ("BOILCV_DATA", "/tmp/boiling"),
            ("BOILCV_JOBS", "4"),
            ("BOILCV_NUM_FRAMES", "100"),
            ("BOILCV_BLOCK_SIZE", "15"),
            ("BOILCV_TRACK_RADIUS", "6.5"),
        ])
        .unwrap();

        assert_eq!(config.data_root, PathBuf::from("/tmp/boiling"));
        assert_eq!(config.jobs, 4);
        assert_eq!(config.num_frames, Some(100));
        assert_eq!(config.binarize.block_size, 15);
        assert_eq!(config.track.max_displacement_px, 6.5);
    }

    #[test]
    fn bad_values_are_reported() {
        let err = load(&[("BOILCV_JOBS", "many")]).unwrap_err();
        assert!(err.to_string().contains("BOILCV_JOBS"));
        assert!(load(&[("BOILCV_BLOCK_SIZE", "8")]).is_err());
    }
}
