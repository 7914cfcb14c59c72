mod common;

use common::synthetic_view::{
    compositer, constant_view, falling_weights, gradient_view, max_rgb_difference,
    rising_weights, snapshot,
};
use pano_compositer::image::Rgb;
use pano_compositer::{CompositerOptions, Error, MultiBandCompositer, TileStore, TileStoreOptions};
use std::sync::Arc;

#[test]
fn constant_full_coverage_view_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let mut comp = compositer(dir.path(), 16, 16, 3, 8, 64);

    let c = Rgb::new(0.5, 0.25, 0.125);
    let (color, mask, weight) = constant_view(16, 16, c);
    comp.append(&color, &mask, &weight, 0, 0).unwrap();
    comp.terminate().unwrap();

    let out = snapshot(&comp);
    for (i, px) in out.data.iter().enumerate() {
        assert!(
            (px.r - c.r).abs() < 1e-5
                && (px.g - c.g).abs() < 1e-5
                && (px.b - c.b).abs() < 1e-5,
            "pixel {i}: {px:?}"
        );
        assert_eq!(px.a, 1.0, "pixel {i} lost coverage");
    }
}

#[test]
fn gradient_full_coverage_view_round_trips_in_the_interior() {
    let dir = tempfile::tempdir().unwrap();
    let mut comp = compositer(dir.path(), 32, 16, 3, 8, 64);

    let (color, mask, weight) = gradient_view(32, 16);
    comp.append(&color, &mask, &weight, 0, 0).unwrap();
    comp.terminate().unwrap();

    let out = snapshot(&comp);
    for y in 2..14 {
        for x in 2..30 {
            let p = out.get(x, y);
            let q = color.get(x, y);
            assert!(
                (p.r - q.r).abs() < 1e-3
                    && (p.g - q.g).abs() < 1e-3
                    && (p.b - q.b).abs() < 1e-3,
                "({x},{y}): {p:?} vs {q:?}"
            );
        }
    }
    assert!(out.data.iter().all(|p| p.a == 1.0));
}

#[test]
fn disjoint_halves_keep_their_colors_away_from_the_seams() {
    let dir = tempfile::tempdir().unwrap();
    let mut comp = compositer(dir.path(), 16, 8, 2, 8, 64);

    let c1 = Rgb::new(0.8, 0.1, 0.1);
    let c2 = Rgb::new(0.1, 0.1, 0.8);
    let (color1, mask1, weight1) = constant_view(8, 8, c1);
    let (color2, mask2, weight2) = constant_view(8, 8, c2);
    comp.append(&color1, &mask1, &weight1, 0, 0).unwrap();
    comp.append(&color2, &mask2, &weight2, 8, 0).unwrap();
    comp.terminate().unwrap();

    // the halves touch at x=8 and, through wrap, at x=0; stay 2 px clear
    let out = snapshot(&comp);
    for y in 0..8 {
        for x in 2..6 {
            let p = out.get(x, y);
            assert!(
                (p.r - c1.r).abs() < 1e-4 && (p.b - c1.b).abs() < 1e-4,
                "left half ({x},{y}): {p:?}"
            );
        }
        for x in 10..14 {
            let p = out.get(x, y);
            assert!(
                (p.r - c2.r).abs() < 1e-4 && (p.b - c2.b).abs() < 1e-4,
                "right half ({x},{y}): {p:?}"
            );
        }
    }
    assert!(out.data.iter().all(|p| p.a == 1.0));
}

#[test]
fn overlapping_views_blend_into_a_smooth_transition() {
    let dir = tempfile::tempdir().unwrap();
    let mut comp = compositer(dir.path(), 16, 8, 2, 8, 64);

    let red = Rgb::new(0.9, 0.05, 0.05);
    let blue = Rgb::new(0.05, 0.05, 0.9);
    let (color1, mask1, _) = constant_view(8, 8, red);
    let (color2, mask2, _) = constant_view(8, 8, blue);
    comp.append(&color1, &mask1, &falling_weights(8, 8), 0, 0).unwrap();
    comp.append(&color2, &mask2, &rising_weights(8, 8), 4, 0).unwrap();
    comp.terminate().unwrap();

    let out = snapshot(&comp);
    for y in 0..8 {
        // each side keeps its dominant hue
        let left = out.get(3, y);
        let right = out.get(9, y);
        assert!(left.r > left.b, "({y}): left not red: {left:?}");
        assert!(right.b > right.r, "({y}): right not blue: {right:?}");

        // the middle of the overlap is a genuine mix
        let mid = out.get(6, y);
        assert!(
            mid.r > 0.1 && mid.r < 0.9 && mid.b > 0.1 && mid.b < 0.9,
            "({y}): no purple gradient at the center: {mid:?}"
        );

        // no hard edge inside the overlap
        for x in 4..10 {
            let p = out.get(x, y);
            let q = out.get(x + 1, y);
            assert!(
                (p.r - q.r).abs() < 0.3 && (p.b - q.b).abs() < 0.3,
                "jump between x={x} and x={} at y={y}: {p:?} vs {q:?}",
                x + 1
            );
        }
        for x in 0..12 {
            let p = out.get(x, y);
            assert!(p.r.is_finite() && p.g.is_finite() && p.b.is_finite());
        }
    }
}

#[test]
fn meridian_straddling_view_covers_both_ends() {
    let dir = tempfile::tempdir().unwrap();
    let mut comp = compositer(dir.path(), 16, 8, 2, 8, 64);

    let c = Rgb::new(0.3, 0.6, 0.9);
    let (color, mask, weight) = constant_view(8, 8, c);
    comp.append(&color, &mask, &weight, 12, 0).unwrap();
    comp.terminate().unwrap();

    let out = snapshot(&comp);
    for y in 0..8 {
        // the meridian core, 2 px clear of the footprint edges at x=4 and 12
        for x in [14usize, 15, 0, 1] {
            let p = out.get(x, y);
            assert!(
                (p.r - c.r).abs() < 1e-4
                    && (p.g - c.g).abs() < 1e-4
                    && (p.b - c.b).abs() < 1e-4,
                "({x},{y}): {p:?}"
            );
        }
        // coverage follows the footprint across the wrap
        for x in 0..16usize {
            let covered = !(4..12).contains(&x);
            let p = out.get(x, y);
            assert_eq!(p.a, if covered { 1.0 } else { 0.0 }, "alpha at ({x},{y})");
            assert!(p.r.is_finite() && p.g.is_finite() && p.b.is_finite());
        }
    }
}

#[test]
fn offsets_shifted_by_the_panorama_width_are_identical() {
    let mut snapshots = Vec::new();
    for offset in [12i64, 12 + 16, 12 - 16] {
        let dir = tempfile::tempdir().unwrap();
        let mut comp = compositer(dir.path(), 16, 8, 2, 8, 64);
        let (color, mask, weight) = constant_view(8, 8, Rgb::new(0.2, 0.5, 0.7));
        comp.append(&color, &mask, &weight, offset, 0).unwrap();
        comp.terminate().unwrap();
        snapshots.push(snapshot(&comp));
    }
    assert_eq!(snapshots[0].data, snapshots[1].data);
    assert_eq!(snapshots[0].data, snapshots[2].data);
}

#[test]
fn tight_tile_budget_matches_the_unbounded_run() {
    let mut snapshots = Vec::new();
    for cap in [4usize, 256] {
        let dir = tempfile::tempdir().unwrap();
        let mut comp = compositer(dir.path(), 32, 32, 3, 8, cap);

        let (color1, mask1, _) = gradient_view(16, 16);
        let (color2, mask2, _) = gradient_view(16, 16);
        comp.append(&color1, &mask1, &falling_weights(16, 16), 8, 4).unwrap();
        // second view wraps across the meridian
        comp.append(&color2, &mask2, &rising_weights(16, 16), 24, 12).unwrap();
        comp.terminate().unwrap();
        snapshots.push(snapshot(&comp));
    }
    assert_eq!(
        snapshots[0].data, snapshots[1].data,
        "paging through 4 resident tiles changed the output"
    );
}

#[test]
fn rebuild_without_views_is_empty_and_finite() {
    let dir = tempfile::tempdir().unwrap();
    let mut comp = compositer(dir.path(), 16, 8, 2, 8, 64);
    comp.terminate().unwrap();

    let out = snapshot(&comp);
    for px in &out.data {
        assert_eq!((px.r, px.g, px.b), (0.0, 0.0, 0.0));
        assert_eq!(px.a, 0.0);
    }
}

#[test]
fn append_order_does_not_change_the_blend() {
    let (red_color, red_mask, _) = constant_view(8, 8, Rgb::new(0.9, 0.1, 0.1));
    let (blue_color, blue_mask, _) = constant_view(8, 8, Rgb::new(0.1, 0.1, 0.9));
    let (grad_color, grad_mask, grad_weight) = gradient_view(8, 8);
    let red_weight = falling_weights(8, 8);
    let blue_weight = rising_weights(8, 8);

    let run = |order: &[usize]| {
        let dir = tempfile::tempdir().unwrap();
        let mut comp = compositer(dir.path(), 16, 8, 2, 8, 64);
        for &view in order {
            match view {
                0 => comp.append(&red_color, &red_mask, &red_weight, 0, 0).unwrap(),
                1 => comp.append(&blue_color, &blue_mask, &blue_weight, 4, 0).unwrap(),
                _ => comp.append(&grad_color, &grad_mask, &grad_weight, 10, 0).unwrap(),
            }
        }
        comp.terminate().unwrap();
        snapshot(&comp)
    };

    let forward = run(&[0, 1, 2]);
    let backward = run(&[2, 1, 0]);
    let difference = max_rgb_difference(&forward, &backward);
    assert!(
        difference < 1e-4,
        "append order changed the blend by {difference}"
    );
}

#[test]
fn indivisible_panorama_dimensions_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        TileStore::create(TileStoreOptions::default().with_scratch_dir(dir.path())).unwrap(),
    );
    let result = MultiBandCompositer::initialize(
        &store,
        10,
        10,
        CompositerOptions::default().with_max_levels(3),
    );
    assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
}

#[test]
fn mismatched_view_planes_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut comp = compositer(dir.path(), 16, 8, 2, 8, 64);
    let (color, mask, _) = constant_view(8, 8, Rgb::new(0.5, 0.5, 0.5));
    let narrow_weight = falling_weights(4, 8);
    assert!(matches!(
        comp.append(&color, &mask, &narrow_weight, 0, 0),
        Err(Error::DimensionMismatch { .. })
    ));
}
