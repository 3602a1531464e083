mod bubble;

use std::{env, fs, path::PathBuf, str::FromStr};

use anyhow::Context;
use bubble::{simulate, Levels};
use chrono::{SubsecRound, Utc};
use cine::CineWriter;
use rand::{rngs::StdRng, SeedableRng};

/// Writes a synthetic boiling recording to `<BOILCV_DATA>/cines/`.
///
/// | Env Var       | Default  |
/// |---------------|----------|
/// | `BOILCV_DATA` | `data`   |
/// | `SIM_SIZE`    | `128`    |
/// | `SIM_FRAMES`  | `60`     |
/// | `SIM_BUBBLES` | `6`      |
/// | `SIM_SEED`    | random   |
/// | `SIM_FPS`     | `1000`   |
fn main() -> anyhow::Result<()> {
    setup_logging();

    let root = PathBuf::from(env::var("BOILCV_DATA").unwrap_or_else(|_| "data".into()));
    let size: usize = var("SIM_SIZE")?.unwrap_or(128);
    let frames: usize = var("SIM_FRAMES")?.unwrap_or(60);
    let bubbles: usize = var("SIM_BUBBLES")?.unwrap_or(6);
    let fps: u32 = var("SIM_FPS")?.unwrap_or(1000);
    let seed: u64 = var("SIM_SEED")?.unwrap_or_else(rand::random);

    log::info!("Simulating {bubbles} bubbles over {frames} frames of {size}x{size} (seed {seed})");
    let mut rng = StdRng::seed_from_u64(seed);
    let video = simulate(&mut rng, size, bubbles, frames, &Levels::default());

    let trigger = Utc::now().trunc_subsecs(0);
    let dir = root.join("cines");
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("{}.cine", trigger.format("Y%Y%m%d%H%M%S")));

    CineWriter::new(size, size, 16)
        .frame_rate(fps)
        .trigger_time(trigger)
        .description(format!("simulated, seed {seed}"))
        .write_file(&path, &video)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Wrote {}", path.display());

    Ok(())
}

fn var<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .ok()
        .map(|v| v.trim().parse::<T>().with_context(|| format!("{key} has invalid value '{v}'")))
        .transpose()
}

fn setup_logging() {
    simple_log::quick!();
}
