//! Модуль конфигурации генерации
//!
//! Все параметры прогона в одной сериализуемой структуре; загружается из
//! JSON и проверяется до того, как будет записан хоть один файл.

use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::compositor::ResizeFilter;
use crate::crop::CropConfig;
use crate::manifest::MANIFEST_FILE;
use crate::negative::{NegativeConfig, NoiseConfig};
use crate::occlusion::OcclusionConfig;
use crate::placement::{PlacementConfig, PlacementMode};
use crate::registry::CLASS_MAP_FILE;
use crate::SynthError;

/// Какие выборки генерировать
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartitionSelection {
    /// Обе выборки, каталог вывода очищается
    #[default]
    Both,
    /// Только тестовая; обучающая и карта классов сохраняются
    TestOnly,
}

/// Число реплик на одно окно: равномерно из [min, max]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaCount {
    pub min: u32,
    pub max: u32,
}

impl ReplicaCount {
    pub fn fixed(count: u32) -> Self {
        Self {
            min: count,
            max: count,
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        if self.min >= self.max {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }
}

/// Конфигурация прогона
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Каталог обоев
    pub background_dir: PathBuf,
    /// Корень окон для обучающей выборки (по подкаталогу на класс)
    pub foreground_root_train: PathBuf,
    /// Корень окон для тестовой выборки; по умолчанию тот же
    pub foreground_root_test: Option<PathBuf>,
    /// Корень датасета
    pub output_dir: PathBuf,
    /// Путь манифеста; по умолчанию `<output_dir>/data.yaml`
    pub manifest_path: Option<PathBuf>,
    /// Seed прогона
    pub seed: u64,
    /// Доля фонов в обучающей выборке, (0, 1]
    pub train_ratio: f64,
    pub train_replicas: ReplicaCount,
    pub test_replicas: ReplicaCount,
    pub partitions: PartitionSelection,
    /// Размер пула потоков; `None` - по числу ядер
    pub threads: Option<usize>,
    /// Качество JPEG, 1..=100
    pub jpeg_quality: u8,
    pub resize_filter: ResizeFilter,
    pub placement: PlacementConfig,
    pub crop: CropConfig,
    pub occlusion: OcclusionConfig,
    pub noise: NoiseConfig,
    pub negatives: NegativeConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            background_dir: PathBuf::from("dataset/wallpapers"),
            foreground_root_train: PathBuf::from("dataset/foregrounds_train"),
            foreground_root_test: None,
            output_dir: PathBuf::from("dataset/generated"),
            manifest_path: None,
            seed: 0,
            train_ratio: 0.9,
            train_replicas: ReplicaCount::fixed(100),
            test_replicas: ReplicaCount::fixed(75),
            partitions: PartitionSelection::Both,
            threads: None,
            jpeg_quality: 95,
            resize_filter: ResizeFilter::Lanczos3,
            placement: PlacementConfig::default(),
            crop: CropConfig::default(),
            occlusion: OcclusionConfig::default(),
            noise: NoiseConfig::default(),
            negatives: NegativeConfig::default(),
        }
    }
}

impl GenerationConfig {
    /// Загрузка из JSON-файла (отсутствующие поля - значения по умолчанию)
    pub fn from_json_file(path: &Path) -> Result<Self, SynthError> {
        let raw = fs::read_to_string(path).map_err(|source| SynthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: GenerationConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn foreground_root_for_test(&self) -> &Path {
        self.foreground_root_test
            .as_deref()
            .unwrap_or(self.foreground_root_train.as_path())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.manifest_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join(MANIFEST_FILE))
    }

    pub fn class_map_path(&self) -> PathBuf {
        self.output_dir.join(CLASS_MAP_FILE)
    }

    /// Проверка параметров
    pub fn validate(&self) -> Result<(), SynthError> {
        let mut problems = Vec::new();

        if !(self.train_ratio > 0.0 && self.train_ratio <= 1.0) {
            problems.push(format!("train_ratio {} outside (0, 1]", self.train_ratio));
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            problems.push(format!("jpeg_quality {} outside 1..=100", self.jpeg_quality));
        }
        for (name, replicas) in [("train", self.train_replicas), ("test", self.test_replicas)] {
            if replicas.min > replicas.max {
                problems.push(format!(
                    "{name}_replicas min {} > max {}",
                    replicas.min, replicas.max
                ));
            }
        }
        if self.threads == Some(0) {
            problems.push("threads must be positive".to_string());
        }

        let p = &self.placement;
        if p.mode == PlacementMode::Scaled {
            check_scale("placement", p.scale_min, p.scale_max, &mut problems);
        }
        if !(p.max_height_fraction > 0.0 && p.max_height_fraction <= 1.0) {
            problems.push(format!(
                "placement.max_height_fraction {} outside (0, 1]",
                p.max_height_fraction
            ));
        }

        if self.crop.enabled {
            check_ratio("crop.min_ratio", self.crop.min_ratio, &mut problems);
        }
        check_ratio(
            "negatives.distractor_crop_ratio",
            self.negatives.distractor_crop_ratio,
            &mut problems,
        );
        check_scale("noise", self.noise.scale_min, self.noise.scale_max, &mut problems);
        if !(self.occlusion.scale_min > 0.0 && self.occlusion.scale_min <= self.occlusion.scale_max)
        {
            problems.push(format!(
                "occlusion scale [{}, {}] must satisfy 0 < min <= max",
                self.occlusion.scale_min, self.occlusion.scale_max
            ));
        }

        for (name, value) in [
            ("crop.probability", self.crop.probability),
            ("occlusion.probability", self.occlusion.probability),
            ("noise.probability", self.noise.probability),
            (
                "negatives.distractor_crop_probability",
                self.negatives.distractor_crop_probability,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                problems.push(format!("{name} {value} outside [0, 1]"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SynthError::Configuration(problems.join("; ")))
        }
    }
}

fn check_scale(name: &str, min: f64, max: f64, problems: &mut Vec<String>) {
    if !(min > 0.0 && min <= max && max <= 1.0) {
        problems.push(format!("{name} scale [{min}, {max}] must satisfy 0 < min <= max <= 1"));
    }
}

fn check_ratio(name: &str, value: f64, problems: &mut Vec<String>) {
    if !(value > 0.0 && value < 1.0) {
        problems.push(format!("{name} {value} outside (0, 1)"));
    }
}
