//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use synth_core::{GenerationConfig, ReplicaCount};

pub const CLASSES: [&str; 3] = ["Claude", "Gemini", "ChatGPT"];

pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Diagonal gradient, so JPEG output depends on where things land
pub fn wallpaper(width: u32, height: u32, tint: u8) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            ((x * 255) / width.max(1)) as u8,
            ((y * 255) / height.max(1)) as u8,
            tint,
            255,
        ])
    })
}

/// Window with a title bar and transparent rounded corners
pub fn window(width: u32, height: u32, color: [u8; 3]) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let corner = (x < 2 || x >= width - 2) && (y < 2 || y >= height - 2);
        if corner {
            Rgba([0, 0, 0, 0])
        } else if y < height / 6 {
            Rgba([40, 40, 40, 255])
        } else {
            Rgba([color[0], color[1], color[2], 255])
        }
    })
}

pub struct Fixture {
    pub dir: tempfile::TempDir,
}

impl Fixture {
    /// 10 wallpapers, 2 windows per class, 2 distractors
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Self { dir };

        fs::create_dir_all(fixture.backgrounds()).unwrap();
        for i in 0..10u32 {
            wallpaper(160 + i * 8, 120, (i * 20) as u8)
                .save(fixture.backgrounds().join(format!("wall_{i:02}.png")))
                .unwrap();
        }

        for (k, class) in CLASSES.iter().enumerate() {
            let class_dir = fixture.foregrounds().join(class);
            fs::create_dir_all(&class_dir).unwrap();
            for j in 0..2u32 {
                window(48 + j * 16, 32 + j * 8, [60 * k as u8, 200, 90])
                    .save(class_dir.join(format!("shot_{j}.png")))
                    .unwrap();
            }
        }

        let distractors = fixture.foregrounds().join("distractors");
        fs::create_dir_all(&distractors).unwrap();
        for j in 0..2u32 {
            window(40, 30 + j * 10, [220, 220, 30])
                .save(distractors.join(format!("other_{j}.png")))
                .unwrap();
        }
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn backgrounds(&self) -> PathBuf {
        self.root().join("wallpapers")
    }

    pub fn foregrounds(&self) -> PathBuf {
        self.root().join("foregrounds")
    }

    pub fn config(&self, output: &str) -> GenerationConfig {
        let mut config = GenerationConfig {
            background_dir: self.backgrounds(),
            foreground_root_train: self.foregrounds(),
            output_dir: self.root().join(output),
            seed: 7,
            train_replicas: ReplicaCount::fixed(2),
            test_replicas: ReplicaCount::fixed(1),
            threads: Some(2),
            jpeg_quality: 90,
            ..GenerationConfig::default()
        };
        config.crop.enabled = true;
        config.negatives.train_count = 4;
        config.negatives.test_count = 2;
        config
    }
}

/// Sorted (file name, bytes) of every file under `dir`
pub fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<(String, Vec<u8>)> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_file())
        .map(|p| {
            (
                p.file_name().unwrap().to_string_lossy().into_owned(),
                fs::read(&p).unwrap(),
            )
        })
        .collect();
    files.sort();
    files
}
