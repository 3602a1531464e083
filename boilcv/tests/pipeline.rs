use std::{fs, path::Path};

use artifacts::{ArtifactKind, ContourTable, Table, TrackTable};
use boilcv::{run_all, run_stages, Config, Stage};
use chrono::{TimeZone, Utc};
use cine::CineWriter;
use vision::video::{read_roi, GrayVideoReader, MaskVideoReader};

const SIZE: usize = 64;
const FRAMES: usize = 8;

/// 12-bit frames of a bright circular chamber on a dark surround, with two
/// dark 6x6 bubbles rising one pixel per frame.
fn synthetic_frames() -> Vec<Vec<u16>> {
    (0..FRAMES)
        .map(|f| {
            let bubbles = [(14 + f, 18), (14 + f, 40)];
            let mut pixels = vec![0u16; SIZE * SIZE];
            for (i, p) in pixels.iter_mut().enumerate() {
                let (r, c) = (i / SIZE, i % SIZE);
                let (dy, dx) = (r as f64 - 32.0, c as f64 - 32.0);
                let in_chamber = dy * dy + dx * dx <= 28.0 * 28.0;
                let in_bubble = bubbles.iter().any(|&(y, x)| (y..y + 6).contains(&r) && (x..x + 6).contains(&c));
                *p = match (in_chamber, in_bubble) {
                    (true, true) => 500,
                    (true, false) => 3000,
                    (false, _) => 200,
                };
            }
            pixels
        })
        .collect()
}

fn write_cine(root: &Path, stem: &str) {
    let dir = root.join("cines");
    fs::create_dir_all(&dir).unwrap();
    CineWriter::new(SIZE, SIZE, 16)
        .real_bpp(12)
        .frame_rate(1000)
        .trigger_time(Utc.with_ymd_and_hms(2023, 9, 20, 17, 14, 18).unwrap())
        .description("synthetic")
        .write_file(dir.join(format!("{stem}.cine")), &synthetic_frames())
        .unwrap();
}

fn tracks(config: &Config, name: &str) -> TrackTable {
    TrackTable::read_from(config.store().open(name, ArtifactKind::Tracks).unwrap()).unwrap()
}

#[test]
fn pipeline_produces_every_artifact() {
    let dir = tempfile::tempdir().unwrap();
    write_cine(dir.path(), "Y20230920171418");
    let config = Config::new(dir.path());

    let reports = run_all(&config).unwrap();

    assert_eq!(reports.len(), Stage::ALL.len());
    for report in &reports {
        assert!(report.is_success(), "{report:?}");
        assert_eq!(report.processed, vec!["2023-09-20T17-14-18".to_string()]);
    }

    let name = "2023-09-20T17-14-18";
    let store = config.store();
    for stage in Stage::ALL {
        assert!(store.exists(name, stage.output()), "{} missing", stage.output());
    }
    for kind in [ArtifactKind::Binarized, ArtifactKind::Filled, ArtifactKind::Contours] {
        assert!(store.stage_path(name, kind).mirror.unwrap().is_file());
    }

    let gray = GrayVideoReader::new(store.open(name, ArtifactKind::Gray).unwrap()).unwrap();
    assert_eq!(gray.bit_depth(), 12);
    assert_eq!((gray.shape().frames, gray.shape().height, gray.shape().width), (FRAMES, SIZE, SIZE));

    let (_, roi) = read_roi(store.open(name, ArtifactKind::Roi).unwrap()).unwrap();
    assert!(roi[(32, 32)]);
    assert!(!roi[(0, 0)]);
    assert!(!roi[(32, 3)]);

    let contours = ContourTable::read_from(store.open(name, ArtifactKind::Contours).unwrap()).unwrap();
    assert_eq!(contours.contour_count(), 2 * FRAMES);

    let binarized: Vec<_> = MaskVideoReader::new(store.open(name, ArtifactKind::Binarized).unwrap())
        .unwrap()
        .collect::<vision::Result<_>>()
        .unwrap();
    let filled: Vec<_> = MaskVideoReader::new(store.open(name, ArtifactKind::Filled).unwrap())
        .unwrap()
        .collect::<vision::Result<_>>()
        .unwrap();
    assert_eq!(filled, binarized);

    let tracks = tracks(&config, name);
    assert_eq!(tracks.track_ids().len(), 2);
    for id in tracks.track_ids() {
        let rows = tracks.track(id);
        assert_eq!(rows.len(), FRAMES);
        assert!(rows.windows(2).all(|w| w[1].frame == w[0].frame + 1 && w[1].y - w[0].y == 1.0));
    }
}

#[test]
fn rerun_skips_what_exists() {
    let dir = tempfile::tempdir().unwrap();
    write_cine(dir.path(), "run_01");
    let config = Config::new(dir.path());
    run_all(&config).unwrap();

    let store = config.store();
    let tracks_path = store.stage_path("run_01", ArtifactKind::Tracks).compressed;
    let gray_path = store.stage_path("run_01", ArtifactKind::Gray).compressed;
    let before = fs::read(&tracks_path).unwrap();
    let gray_modified = fs::metadata(&gray_path).unwrap().modified().unwrap();

    let reports = run_all(&config).unwrap();
    assert!(reports.iter().all(|r| r.processed.is_empty() && r.skipped == vec!["run_01".to_string()]));
    assert_eq!(fs::metadata(&gray_path).unwrap().modified().unwrap(), gray_modified);

    fs::remove_file(&tracks_path).unwrap();
    let reports = run_stages(&config, &[Stage::Track]).unwrap();
    assert_eq!(reports[0].processed, vec!["run_01".to_string()]);
    assert_eq!(fs::read(&tracks_path).unwrap(), before);
}

#[test]
fn reprocessing_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    write_cine(dir.path(), "run_02");
    let config = Config::new(dir.path());
    run_all(&config).unwrap();

    let store = config.store();
    let snapshot = || -> Vec<Vec<u8>> {
        Stage::ALL
            .iter()
            .map(|s| fs::read(store.stage_path("run_02", s.output()).compressed).unwrap())
            .collect()
    };
    let first = snapshot();

    let reports = run_all(&Config { reprocess: true, ..config.clone() }).unwrap();
    assert!(reports.iter().all(|r| r.processed == vec!["run_02".to_string()]));
    assert_eq!(snapshot(), first);
}

#[test]
fn a_broken_video_does_not_stop_the_others() {
    let dir = tempfile::tempdir().unwrap();
    write_cine(dir.path(), "good");
    fs::write(dir.path().join("cines").join("broken.cine"), b"not a cine").unwrap();
    let config = Config { jobs: 2, ..Config::new(dir.path()) };

    let reports = run_stages(&config, &[Stage::Ingest]).unwrap();

    assert_eq!(reports[0].processed, vec!["good".to_string()]);
    assert_eq!(reports[0].failed.len(), 1);
    assert_eq!(reports[0].failed[0].0, "broken");
    assert!(!config.store().exists("broken", ArtifactKind::Gray));
}

#[test]
fn tracking_falls_back_to_filled_video() {
    let dir = tempfile::tempdir().unwrap();
    write_cine(dir.path(), "run_03");
    let config = Config::new(dir.path());
    run_all(&config).unwrap();
    let expected = tracks(&config, "run_03");

    let store = config.store();
    fs::remove_file(store.stage_path("run_03", ArtifactKind::Contours).compressed).unwrap();
    fs::remove_file(store.stage_path("run_03", ArtifactKind::Tracks).compressed).unwrap();

    let reports = run_stages(&config, &[Stage::Track]).unwrap();
    assert!(reports[0].is_success(), "{:?}", reports[0]);
    assert_eq!(tracks(&config, "run_03"), expected);
}

#[test]
fn failed_media_export_keeps_the_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    write_cine(dir.path(), "run_05");
    let config = Config { write_media: true, ..Config::new(dir.path()) };
    fs::create_dir_all(dir.path().join("media")).unwrap();
    fs::write(config.media_dir("run_05"), b"in the way").unwrap();

    let reports = run_all(&config).unwrap();

    assert!(reports.iter().all(|r| r.is_success()), "{reports:?}");
    let store = config.store();
    for stage in Stage::ALL {
        assert!(store.exists("run_05", stage.output()), "{} missing", stage.output());
    }
}

#[test]
fn media_is_exported_next_to_the_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    write_cine(dir.path(), "run_06");
    let config = Config { write_media: true, ..Config::new(dir.path()) };

    run_all(&config).unwrap();

    for file in ["max.png", "roi.png", "binarized.png", "filled.png"] {
        assert!(config.media_dir("run_06").join(file).is_file(), "{file} missing");
    }
}

#[test]
fn missing_inputs_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_cine(dir.path(), "run_04");
    let config = Config::new(dir.path());
    run_stages(&config, &[Stage::Ingest]).unwrap();

    let reports = run_stages(&config, &[Stage::Binarize]).unwrap();

    assert_eq!(reports[0].failed.len(), 1);
    assert!(reports[0].failed[0].1.contains("Missing roi artifact for run_04"));
}
