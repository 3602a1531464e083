mod binarize;
mod contours;
mod fill;
mod ingest;
mod roi;
mod track;

use std::{
    collections::BTreeMap,
    fmt, io,
    path::{Path, PathBuf},
};

use artifacts::{is_transient_io, ArtifactError, ArtifactKind};
use cine::CineError;
use rayon::prelude::*;
use vision::VisionError;

use crate::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Ingest,
    Roi,
    Binarize,
    Contours,
    Fill,
    Track,
}

impl Stage {
    pub const ALL: [Stage; 6] = [Stage::Ingest, Stage::Roi, Stage::Binarize, Stage::Contours, Stage::Fill, Stage::Track];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Roi => "roi",
            Stage::Binarize => "binarize",
            Stage::Contours => "contours",
            Stage::Fill => "fill",
            Stage::Track => "track",
        }
    }

    /// The artifact this stage writes for every video.
    pub fn output(self) -> ArtifactKind {
        match self {
            Stage::Ingest => ArtifactKind::Gray,
            Stage::Roi => ArtifactKind::Roi,
            Stage::Binarize => ArtifactKind::Binarized,
            Stage::Contours => ArtifactKind::Contours,
            Stage::Fill => ArtifactKind::Filled,
            Stage::Track => ArtifactKind::Tracks,
        }
    }

    fn process(self, config: &Config, name: &str, source: &Path) -> anyhow::Result<String> {
        match self {
            Stage::Ingest => ingest::process(config, name, source),
            Stage::Roi => roi::process(config, name),
            Stage::Binarize => binarize::process(config, name),
            Stage::Contours => contours::process(config, name),
            Stage::Fill => fill::process(config, name),
            Stage::Track => track::process(config, name),
        }
    }

    /// Videos this stage could run on, mapped to the file they come from.
    fn sources(self, config: &Config) -> anyhow::Result<BTreeMap<String, PathBuf>> {
        let store = config.store();
        Ok(match self {
            Stage::Ingest => store.list_cines()?,
            _ => store
                .list_videos()?
                .into_iter()
                .map(|name| {
                    let path = store.stage_path(&name, ArtifactKind::Gray).compressed;
                    (name, path)
                })
                .collect(),
        })
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What one stage did with every video it saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub processed: Vec<String>,
    pub skipped: Vec<String>,
    /// Video names with the error chain that stopped them.
    pub failed: Vec<(String, String)>,
}

impl StageReport {
    fn new(stage: Stage) -> Self {
        Self { stage, processed: Vec::new(), skipped: Vec::new(), failed: Vec::new() }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs `stage` on every video lacking its output, or on all of them when
/// reprocessing. Failures are isolated per video and collected in the report.
pub fn run_stage(config: &Config, stage: Stage) -> anyhow::Result<StageReport> {
    let store = config.store();
    let sources = stage.sources(config)?;
    let mut report = StageReport::new(stage);

    let todo: Vec<(String, PathBuf)> = if config.reprocess {
        sources.into_iter().collect()
    } else {
        let missing = store.unprocessed(sources.keys(), stage.output());
        let (todo, done): (Vec<_>, Vec<_>) = sources.into_iter().partition(|(name, _)| missing.contains_key(name));
        for (name, _) in done {
            log::debug!("[{stage}] {name}: {} present, skipping", stage.output());
            report.skipped.push(name);
        }
        todo
    };
    log::info!("[{stage}] {} to process, {} already done", todo.len(), report.skipped.len());

    let run = |(name, source): &(String, PathBuf)| {
        let result = with_retry(stage, name, || stage.process(config, name, source));
        (name.clone(), result)
    };
    let results: Vec<(String, anyhow::Result<String>)> = if config.jobs > 1 {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(config.jobs).build()?;
        pool.install(|| todo.par_iter().map(run).collect())
    } else {
        todo.iter().map(run).collect()
    };

    for (name, result) in results {
        match result {
            Ok(summary) => {
                log::info!("[{stage}] {name}: {summary}");
                report.processed.push(name);
            }
            Err(e) => {
                log::error!("[{stage}] {name} failed: {e:#}");
                report.failed.push((name, format!("{e:#}")));
            }
        }
    }

    Ok(report)
}

/// Runs every stage in pipeline order.
pub fn run_all(config: &Config) -> anyhow::Result<Vec<StageReport>> {
    run_stages(config, &Stage::ALL)
}

pub fn run_stages(config: &Config, stages: &[Stage]) -> anyhow::Result<Vec<StageReport>> {
    stages.iter().map(|&stage| run_stage(config, stage)).collect()
}

fn with_retry<T>(stage: Stage, name: &str, f: impl Fn() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match f() {
        Err(e) if is_transient(&e) => {
            log::warn!("[{stage}] {name}: {e:#}, retrying once");
            f()
        }
        result => result,
    }
}

fn is_transient(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(e) = cause.downcast_ref::<ArtifactError>() {
            return e.is_transient();
        }
        if let Some(VisionError::Artifact(e)) = cause.downcast_ref::<VisionError>() {
            return e.is_transient();
        }
        if let Some(CineError::Io(e)) = cause.downcast_ref::<CineError>() {
            return is_transient_io(e);
        }
        cause.downcast_ref::<io::Error>().is_some_and(is_transient_io)
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use anyhow::Context;

    use super::*;

    #[test]
    fn transient_errors_are_retried_once() {
        let calls = Cell::new(0);
        let result = with_retry(Stage::Contours, "v", || {
            calls.set(calls.get() + 1);
            Err::<(), _>(ArtifactError::Io(io::Error::from(io::ErrorKind::Interrupted))).context("reading v")
        });

        assert!(result.is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn missing_inputs_are_not_retried() {
        let calls = Cell::new(0);
        let result = with_retry(Stage::Fill, "v", || {
            calls.set(calls.get() + 1);
            Err::<(), _>(ArtifactError::MissingInput { name: "v".into(), kind: ArtifactKind::Contours }.into())
        });

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn wrapped_errors_are_classified() {
        let vision: anyhow::Error = VisionError::Artifact(ArtifactError::Io(io::Error::from(io::ErrorKind::TimedOut))).into();
        assert!(is_transient(&vision));

        let cine: anyhow::Error = CineError::InvalidFormat("bad magic".into()).into();
        assert!(!is_transient(&cine));

        let not_found: anyhow::Error = io::Error::from(io::ErrorKind::NotFound).into();
        assert!(!is_transient(&not_found));
    }

    #[test]
    fn outputs_follow_the_pipeline() {
        let outputs: Vec<ArtifactKind> = Stage::ALL.iter().map(|s| s.output()).collect();
        assert_eq!(
            outputs,
            vec![
                ArtifactKind::Gray,
                ArtifactKind::Roi,
                ArtifactKind::Binarized,
                ArtifactKind::Contours,
                ArtifactKind::Filled,
                ArtifactKind::Tracks
            ]
        );
    }
}
