//! Geometric guarantees of placement, occlusion, crop and label encoding

mod common;

use std::fs;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use synth_core::annotation::{decode, encode};
use synth_core::crop::random_crop;
use synth_core::{
    Annotation, BoundingBox, ClassMap, Compositor, GeometryError, Occluder, OcclusionConfig,
    PlacementConfig, PlacementSampler,
};

#[test]
fn test_placement_stays_inside_background() {
    let mut rng = StdRng::seed_from_u64(2024);

    for trial in 0..10_000 {
        let bg_w = rng.gen_range(320..4000);
        let bg_h = rng.gen_range(320..4000);
        let fg_w = rng.gen_range(100..2000);
        let fg_h = rng.gen_range(100..2000);
        let lo = rng.gen_range(0.1..0.95);
        let hi = rng.gen_range(lo..=0.95);

        let sampler = PlacementSampler::new(PlacementConfig {
            scale_min: lo,
            scale_max: hi,
            ..PlacementConfig::default()
        });
        let p = sampler
            .sample(bg_w, bg_h, fg_w, fg_h, &mut rng)
            .unwrap_or_else(|e| panic!("trial {trial}: {e}"));

        assert!(p.width > 0 && p.height > 0);
        assert!(p.x + p.width <= bg_w, "trial {trial}: {p:?} on {bg_w}x{bg_h}");
        assert!(p.y + p.height <= bg_h, "trial {trial}: {p:?} on {bg_w}x{bg_h}");
        assert!(f64::from(p.height) <= (f64::from(bg_h) * 0.95).round());
    }
}

#[test]
fn test_reference_placement_and_label() {
    // 1920x1080 background, aspect 1.5 window, scale fixed at 0.5
    let sampler = PlacementSampler::default();
    let mut rng = StdRng::seed_from_u64(1);
    let p = sampler
        .sample_in_range(1920, 1080, 1500, 1000, 0.5, 0.5, &mut rng)
        .unwrap();
    assert_eq!((p.width, p.height), (960, 640));
    assert!(f64::from(p.height) <= 1080.0 * 0.95);

    let bbox = BoundingBox::from_origin(0, 0, p.width, p.height, 1920, 1080).unwrap();
    let (cx, cy, w, h) = encode(1920, 1080, &bbox).unwrap();
    assert!((cx - 0.25).abs() < 1e-9);
    assert!((cy - 0.296296).abs() < 1e-6);
    assert!((w - 0.5).abs() < 1e-9);
    assert!((h - 0.592593).abs() < 1e-6);

    let line = Annotation::from_bbox(0, 1920, 1080, &bbox).unwrap().to_line();
    assert_eq!(line, "0 0.250000 0.296296 0.500000 0.592593");
}

#[test]
fn test_tall_window_hits_height_clamp() {
    let sampler = PlacementSampler::default();
    for (bg_w, bg_h) in [(1000u32, 1000u32), (1280, 1024), (1100, 1000)] {
        let (w, h) = sampler.scaled_size(bg_w, bg_h, 500, 1000, 0.9).unwrap();
        let expected_h = (f64::from(bg_h) * 0.95).round() as u32;
        assert_eq!(h, expected_h, "{bg_w}x{bg_h}");
        assert_eq!(w, (f64::from(expected_h) * 0.5).round() as u32);
    }
}

#[test]
fn test_degenerate_geometry_fails_loudly() {
    let sampler = PlacementSampler::default();
    let mut rng = StdRng::seed_from_u64(3);
    assert!(matches!(
        sampler.sample(1920, 1080, 0, 0, &mut rng),
        Err(GeometryError::DegenerateSource { .. })
    ));
    assert!(matches!(
        sampler.sample_in_range(1920, 1080, 100, 100, 0.0, 0.5, &mut rng),
        Err(GeometryError::InvalidScaleRange { .. })
    ));
}

#[test]
fn test_occluder_intersects_for_extreme_scales() {
    let config = OcclusionConfig {
        scale_min: 0.01,
        scale_max: 1.0,
        ..OcclusionConfig::default()
    };
    let occluder = Occluder::new(config, Compositor::default());
    let mut rng = StdRng::seed_from_u64(77);

    for trial in 0..10_000 {
        let img_w = rng.gen_range(2..2000);
        let img_h = rng.gen_range(2..2000);
        let w = rng.gen_range(1..=img_w);
        let h = rng.gen_range(1..=img_h);
        let x = rng.gen_range(0..=img_w - w);
        let y = rng.gen_range(0..=img_h - h);
        let target = BoundingBox::from_origin(x, y, w, h, img_w, img_h).unwrap();

        let rect = occluder
            .sample_rect(&target, rng.gen_range(1..800), rng.gen_range(1..800), &mut rng)
            .unwrap();
        assert!(
            rect.intersects(&target.to_rect()),
            "trial {trial}: {rect:?} vs {target:?}"
        );
    }
}

#[test]
fn test_label_round_trip_within_a_pixel() {
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..5_000 {
        let img_w = rng.gen_range(8..4000);
        let img_h = rng.gen_range(8..4000);
        let x_min = rng.gen_range(0..img_w - 1);
        let y_min = rng.gen_range(0..img_h - 1);
        let x_max = rng.gen_range(x_min + 1..=img_w);
        let y_max = rng.gen_range(y_min + 1..=img_h);
        let bbox = BoundingBox::new(x_min, y_min, x_max, y_max, img_w, img_h).unwrap();

        // through the 6-digit text form, as the trainer would read it
        let line = Annotation::from_bbox(0, img_w, img_h, &bbox).unwrap().to_line();
        let parsed = Annotation::parse_line(&line).unwrap();
        let back = decode(
            img_w,
            img_h,
            (parsed.center_x, parsed.center_y, parsed.width, parsed.height),
        );

        // degenerate 1px boxes can collapse after rounding; everything else must come back
        let Ok(back) = back else {
            assert!(bbox.width() == 1 || bbox.height() == 1, "{bbox:?}");
            continue;
        };
        assert!(back.x_min.abs_diff(bbox.x_min) <= 1, "{bbox:?} -> {back:?}");
        assert!(back.y_min.abs_diff(bbox.y_min) <= 1, "{bbox:?} -> {back:?}");
        assert!(back.x_max.abs_diff(bbox.x_max) <= 1, "{bbox:?} -> {back:?}");
        assert!(back.y_max.abs_diff(bbox.y_max) <= 1, "{bbox:?} -> {back:?}");
    }
}

#[test]
fn test_crop_respects_min_ratio() {
    let mut rng = StdRng::seed_from_u64(8);
    for _ in 0..500 {
        let w = rng.gen_range(3..300);
        let h = rng.gen_range(3..300);
        let ratio = rng.gen_range(0.05..0.95);
        let img = image::RgbaImage::new(w, h);

        let out = random_crop(&img, ratio, &mut rng).unwrap();
        let (cw, ch) = out.dimensions();
        assert!(cw <= w && ch <= h);
        assert!(f64::from(cw) >= (f64::from(w) * ratio).ceil().min(f64::from(w)));
        assert!(f64::from(ch) >= (f64::from(h) * ratio).ceil().min(f64::from(h)));
    }
}

#[test]
fn test_class_ids_ignore_listing_order() {
    let dir = tempfile::tempdir().unwrap();
    for name in common::CLASSES {
        let class_dir = dir.path().join(name);
        fs::create_dir_all(&class_dir).unwrap();
        common::window(20, 10, [1, 1, 1]).save(class_dir.join("w.png")).unwrap();
    }
    let built = ClassMap::build(dir.path()).unwrap();
    assert_eq!(built.id_of("ChatGPT"), Some(0));
    assert_eq!(built.id_of("Claude"), Some(1));
    assert_eq!(built.id_of("Gemini"), Some(2));

    let mut rng = StdRng::seed_from_u64(13);
    let mut names = vec!["Zed", "alpha", "Beta", "Claude", "Gemini", "ChatGPT", "Copilot"];
    let reference = ClassMap::from_names(names.clone());
    for _ in 0..50 {
        names.shuffle(&mut rng);
        assert_eq!(ClassMap::from_names(names.clone()), reference);
    }
}
