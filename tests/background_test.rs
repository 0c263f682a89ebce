mod common;

use common::{BINS, FRAME_NS, RINGS, Scene, scene_config};
use lidartrack_rs::{BackgroundGrid, ForegroundExtractor};

fn grid() -> BackgroundGrid {
    BackgroundGrid::new(scene_config().background)
}

#[test]
fn test_static_scene_converges() {
    let mut grid = grid();
    let mut extractor = ForegroundExtractor::new();
    let mut scene = Scene::varied(7, 0.05);

    let mut fractions = Vec::new();
    for k in 0..150u64 {
        let res = extractor.extract(&mut grid, &scene.frame(k * FRAME_NS));
        fractions.push(res.stats.foreground_fraction);
        if k >= 5 {
            assert_eq!(res.stats.unknown, 0, "frame {k}");
        }
    }
    assert!(fractions.iter().skip(10).all(|&f| f < 1e-3));
    assert!(grid.is_settled());
    assert_eq!(grid.health(150 * FRAME_NS).seeded_ratio, 1.0);

    for ring in 0..RINGS {
        for bin in 0..BINS {
            let cell = grid.cell(ring, bin).unwrap();
            let truth = scene.true_range(ring, bin);
            assert!(
                (cell.mean_range - truth).abs() < 0.05,
                "cell ({ring}, {bin}): {} vs {truth}",
                cell.mean_range
            );
            assert!(cell.spread >= grid.config().min_spread);
        }
    }
}

#[test]
fn test_unseeded_cells_are_unknown() {
    let mut grid = grid();
    let mut extractor = ForegroundExtractor::new();
    let mut scene = Scene::uniform(1, 30.0, 0.02);

    let res = extractor.extract(&mut grid, &scene.frame(0));
    assert_eq!(res.stats.unknown, RINGS * BINS);
    assert_eq!(res.stats.foreground, 0);
    assert_eq!(res.stats.background, 0);
    assert_eq!(res.stats.foreground_fraction, 0.0);
    assert!(res.mask.iter().all(|&fg| !fg));
    // Still seeded from the raw measurements.
    assert_eq!(grid.cell(0, 0).unwrap().accept_count, 1);
}

#[test]
fn test_transient_object_is_foreground_and_frozen() {
    let mut grid = grid();
    let mut extractor = ForegroundExtractor::new();
    let mut scene = Scene::uniform(3, 30.0, 0.02);
    let affected = |ring: usize, bin: usize| (4..8).contains(&ring) && (100..111).contains(&bin);

    let mut ts = 0;
    for _ in 0..20 {
        extractor.extract(&mut grid, &scene.frame(ts));
        ts += FRAME_NS;
    }
    let before: Vec<f64> = grid.cells().iter().map(|c| c.mean_range).collect();

    for _ in 0..5 {
        let res = extractor.extract(&mut grid, &scene.frame_with(ts, affected, 10.0));
        for (i, &fg) in res.mask.iter().enumerate() {
            assert_eq!(fg, affected(i / BINS, i % BINS), "point {i} at {ts}");
        }
        assert_eq!(res.stats.foreground, 4 * 11);
        ts += FRAME_NS;
    }

    // The object left; its cells stay frozen for the freeze window.
    for _ in 0..5 {
        let res = extractor.extract(&mut grid, &scene.frame(ts));
        assert_eq!(res.stats.foreground, 0);
        ts += FRAME_NS;
    }

    let mut drifted = 0;
    for (idx, cell) in grid.cells().iter().enumerate() {
        if affected(idx / BINS, idx % BINS) {
            assert_eq!(cell.mean_range, before[idx], "frozen cell {idx} drifted");
            assert!(cell.is_frozen(ts));
        } else if cell.mean_range != before[idx] {
            drifted += 1;
        }
    }
    // Unfrozen cells kept learning.
    assert!(drifted > RINGS * BINS / 2);
}

#[test]
fn test_single_cell_spike_rejected() {
    let mut grid = grid();
    let mut extractor = ForegroundExtractor::new();
    let mut scene = Scene::uniform(5, 30.0, 0.02);
    for k in 0..10 {
        extractor.extract(&mut grid, &scene.frame(k * FRAME_NS));
    }
    let mean = grid.cell(3, 42).unwrap().mean_range;

    let res = extractor.extract(
        &mut grid,
        &scene.frame_with(10 * FRAME_NS, |r, b| r == 3 && b == 42, 5.0),
    );
    assert_eq!(res.stats.foreground, 0);
    assert_eq!(res.stats.background, RINGS * BINS);
    // Rejected spikes are not learned either.
    assert_eq!(grid.cell(3, 42).unwrap().mean_range, mean);
    assert!(!grid.cell(3, 42).unwrap().is_frozen(10 * FRAME_NS));
}

#[test]
fn test_parked_object_needs_explicit_reset() {
    let mut grid = grid();
    let mut extractor = ForegroundExtractor::new();
    let mut scene = Scene::uniform(11, 30.0, 0.02);
    let parked = |ring: usize, bin: usize| (2..6).contains(&ring) && (200..206).contains(&bin);

    let mut ts = 0;
    for _ in 0..10 {
        extractor.extract(&mut grid, &scene.frame(ts));
        ts += FRAME_NS;
    }
    // Twenty seconds, four times the freeze window.
    let mut last = None;
    for _ in 0..200 {
        last = Some(extractor.extract(&mut grid, &scene.frame_with(ts, parked, 12.0)));
        ts += FRAME_NS;
    }
    assert_eq!(last.unwrap().stats.foreground, 4 * 6);

    for ring in 2..6 {
        for bin in 200..206 {
            assert!(grid.reset_cell(ring, bin));
        }
    }
    assert!(!grid.reset_cell(RINGS, 0));

    // Cells re-seed on the parked object and then treat it as background.
    let mut res = None;
    for _ in 0..10 {
        res = Some(extractor.extract(&mut grid, &scene.frame_with(ts, parked, 12.0)));
        ts += FRAME_NS;
    }
    let res = res.unwrap();
    assert_eq!(res.stats.foreground, 0);
    assert_eq!(res.stats.unknown, 0);
    assert!((grid.cell(3, 203).unwrap().mean_range - 12.0).abs() < 1e-9);
}

#[test]
fn test_snapshot_restore_round_trip() {
    let mut grid = grid();
    let mut extractor = ForegroundExtractor::new();
    let mut scene = Scene::uniform(13, 30.0, 0.02);
    for k in 0..8 {
        extractor.extract(&mut grid, &scene.frame(k * FRAME_NS));
    }
    let snap = grid.snapshot(8 * FRAME_NS);
    let json = serde_json::to_string(&snap).unwrap();

    let mut restored = BackgroundGrid::new(scene_config().background);
    restored
        .restore(&serde_json::from_str(&json).unwrap())
        .unwrap();
    assert_eq!(restored.cells(), grid.cells());
    assert_eq!(restored.frames_processed(), 8);

    let mut other = scene_config().background;
    other.azimuth_bins = 720;
    assert!(BackgroundGrid::new(other).restore(&snap).is_err());
}
