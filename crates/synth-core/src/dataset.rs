//! Модуль структуры датасета
//!
//! Разбиение фонов на выборки, раскладка каталогов
//! `images/{train,test}` + `labels/{train,test}` и детерминированные имена
//! примеров.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::SynthError;

/// Файл с сохранённым разбиением фонов
pub const SPLIT_FILE: &str = "split.json";

/// Выборка
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Train,
    Test,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Train, Partition::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Train => "train",
            Partition::Test => "test",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Категория примера
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Positive,
    Negative,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Positive => "positive",
            Category::Negative => "negative",
        })
    }
}

/// Разбиение фонов: выборки не пересекаются
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSplit {
    pub train: Vec<PathBuf>,
    pub test: Vec<PathBuf>,
}

impl PartitionSplit {
    /// Перемешивание и разрез по доле `train_ratio`.
    ///
    /// При непустом наборе и доле < 1 в каждой выборке минимум один фон
    /// (если фонов хотя бы два).
    pub fn shuffle_split<R: Rng + ?Sized>(
        mut backgrounds: Vec<PathBuf>,
        train_ratio: f64,
        rng: &mut R,
    ) -> Self {
        backgrounds.shuffle(rng);
        let n = backgrounds.len();
        let mut split_idx = (n as f64 * train_ratio).floor() as usize;
        if n > 0 {
            split_idx = split_idx.max(1);
        }
        if train_ratio < 1.0 && n > 1 {
            split_idx = split_idx.min(n - 1);
        }
        let split_idx = split_idx.min(n);
        let test = backgrounds.split_off(split_idx);
        Self {
            train: backgrounds,
            test,
        }
    }

    pub fn get(&self, partition: Partition) -> &[PathBuf] {
        match partition {
            Partition::Train => &self.train,
            Partition::Test => &self.test,
        }
    }

    pub fn load(path: &Path) -> Result<Self, SynthError> {
        let raw = fs::read_to_string(path).map_err(|source| SynthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SynthError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| SynthError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Раскладка каталогов датасета
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self, partition: Partition) -> PathBuf {
        self.root.join("images").join(partition.as_str())
    }

    pub fn labels_dir(&self, partition: Partition) -> PathBuf {
        self.root.join("labels").join(partition.as_str())
    }

    pub fn image_path(&self, partition: Partition, name: &str) -> PathBuf {
        self.images_dir(partition).join(format!("{name}.jpg"))
    }

    pub fn label_path(&self, partition: Partition, name: &str) -> PathBuf {
        self.labels_dir(partition).join(format!("{name}.txt"))
    }

    pub fn split_path(&self) -> PathBuf {
        self.root.join(SPLIT_FILE)
    }

    /// Полная очистка корня и создание каталогов обеих выборок
    pub fn reset_all(&self) -> Result<(), SynthError> {
        if self.root.exists() {
            remove_dir(&self.root)?;
        }
        for partition in Partition::ALL {
            self.create_partition(partition)?;
        }
        Ok(())
    }

    /// Очистка и создание каталогов одной выборки
    pub fn reset_partition(&self, partition: Partition) -> Result<(), SynthError> {
        for dir in [self.images_dir(partition), self.labels_dir(partition)] {
            if dir.exists() {
                remove_dir(&dir)?;
            }
        }
        self.create_partition(partition)
    }

    fn create_partition(&self, partition: Partition) -> Result<(), SynthError> {
        for dir in [self.images_dir(partition), self.labels_dir(partition)] {
            fs::create_dir_all(&dir).map_err(|source| SynthError::Io { path: dir, source })?;
        }
        Ok(())
    }
}

fn remove_dir(dir: &Path) -> Result<(), SynthError> {
    fs::remove_dir_all(dir).map_err(|source| SynthError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// Счётчики имён: монотонные по выборке и категории
#[derive(Debug, Default)]
pub struct NameAllocator {
    counters: HashMap<(Partition, Category), u64>,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self, partition: Partition, category: Category) -> u64 {
        let counter = self.counters.entry((partition, category)).or_insert(0);
        let value = *counter;
        *counter += 1;
        value
    }

    /// `train_Claude_000000`
    pub fn positive(&mut self, partition: Partition, class_name: &str) -> String {
        let n = self.bump(partition, Category::Positive);
        format!("{partition}_{class_name}_{n:06}")
    }

    /// `train_neg_000000`
    pub fn negative(&mut self, partition: Partition) -> String {
        let n = self.bump(partition, Category::Negative);
        format!("{partition}_neg_{n:06}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("bg_{i}.jpg"))).collect()
    }

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let mut rng = StdRng::seed_from_u64(9);
        let split = PartitionSplit::shuffle_split(paths(100), 0.9, &mut rng);
        assert_eq!(split.train.len(), 90);
        assert_eq!(split.test.len(), 10);

        let train: HashSet<_> = split.train.iter().collect();
        assert!(split.test.iter().all(|p| !train.contains(p)));
    }

    #[test]
    fn test_split_is_seeded() {
        let a = PartitionSplit::shuffle_split(paths(30), 0.9, &mut StdRng::seed_from_u64(4));
        let b = PartitionSplit::shuffle_split(paths(30), 0.9, &mut StdRng::seed_from_u64(4));
        assert_eq!(a, b);
    }

    #[test]
    fn test_small_pools() {
        let mut rng = StdRng::seed_from_u64(1);
        let split = PartitionSplit::shuffle_split(paths(2), 0.9, &mut rng);
        assert_eq!((split.train.len(), split.test.len()), (1, 1));

        let split = PartitionSplit::shuffle_split(paths(1), 0.9, &mut rng);
        assert_eq!((split.train.len(), split.test.len()), (1, 0));

        let split = PartitionSplit::shuffle_split(paths(5), 1.0, &mut rng);
        assert_eq!((split.train.len(), split.test.len()), (5, 0));
    }

    #[test]
    fn test_names_are_scoped() {
        let mut names = NameAllocator::new();
        assert_eq!(names.positive(Partition::Train, "Claude"), "train_Claude_000000");
        assert_eq!(names.positive(Partition::Train, "Gemini"), "train_Gemini_000001");
        assert_eq!(names.negative(Partition::Train), "train_neg_000000");
        assert_eq!(names.positive(Partition::Test, "Claude"), "test_Claude_000000");
    }

    #[test]
    fn test_layout_paths() {
        let layout = DatasetLayout::new("/out");
        assert_eq!(
            layout.image_path(Partition::Test, "test_neg_000003"),
            PathBuf::from("/out/images/test/test_neg_000003.jpg")
        );
        assert_eq!(
            layout.label_path(Partition::Train, "x"),
            PathBuf::from("/out/labels/train/x.txt")
        );
    }
}
