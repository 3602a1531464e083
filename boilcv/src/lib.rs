pub mod config;
pub mod media;
pub mod preview;
pub mod stages;

pub use config::Config;
pub use stages::{run_all, run_stage, run_stages, Stage, StageReport};

pub fn setup_logging(config: &Config) {
    if config.debug {
        simple_log::quick!("debug");
    } else {
        simple_log::quick!("info");
    }
}

/// Runs `stages` with the environment's configuration and exits non-zero if
/// any video failed.
pub fn run_cli(stages: &[Stage]) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    setup_logging(&config);
    log::info!("Processing videos under {}", config.data_root.display());

    let reports = run_stages(&config, stages)?;
    let mut failed = 0;
    for report in &reports {
        log::info!(
            "[{}] processed {}, skipped {}, failed {}",
            report.stage,
            report.processed.len(),
            report.skipped.len(),
            report.failed.len()
        );
        failed += report.failed.len();
    }

    if failed > 0 {
        log::error!("{failed} stage runs failed");
        std::process::exit(1);
    }
    Ok(())
}
