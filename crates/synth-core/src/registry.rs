//! Модуль реестра классов
//!
//! Каждый подкаталог корня переднего плана - отдельный класс. ID
//! назначаются по возрастанию имён, поэтому не зависят от порядка, в
//! котором файловая система отдаёт каталоги.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::loader::list_images;
use crate::SynthError;

/// Зарезервированный подкаталог с дистракторами (не класс)
pub const DISTRACTOR_DIR: &str = "distractors";

/// Имя файла сохранённого отображения
pub const CLASS_MAP_FILE: &str = "classes.json";

/// Отображение имя класса -> плотный ID в [0, N)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMap {
    /// Имена в порядке ID (индекс = ID)
    names: Vec<String>,
}

impl ClassMap {
    /// Построение из произвольного набора имён: сортировка и нумерация
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    /// Сканирование корня переднего плана.
    ///
    /// Классом считается любой подкаталог, кроме [`DISTRACTOR_DIR`]; хотя бы
    /// один из них должен содержать изображения.
    pub fn build(root: &Path) -> Result<Self, SynthError> {
        if !root.is_dir() {
            return Err(SynthError::Configuration(format!(
                "foreground root {} does not exist",
                root.display()
            )));
        }

        let entries = fs::read_dir(root).map_err(|source| SynthError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let mut names = Vec::new();
        let mut populated = 0usize;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                log::warn!("Skipping non UTF-8 class folder {:?}", path);
                continue;
            };
            if name == DISTRACTOR_DIR {
                continue;
            }
            if !list_images(&path)?.is_empty() {
                populated += 1;
            } else {
                log::warn!("Class folder '{}' has no images", name);
            }
            names.push(name.to_string());
        }

        if populated == 0 {
            return Err(SynthError::Configuration(format!(
                "no class folders with images under {}",
                root.display()
            )));
        }

        Ok(Self::from_names(names))
    }

    /// Повторное использование сохранённой карты.
    ///
    /// Если файл существует, его набор имён обязан совпадать с текущими
    /// каталогами; иначе ID молча изменились бы между прогонами.
    pub fn load_or_build(root: &Path, persisted: &Path) -> Result<Self, SynthError> {
        let scanned = Self::build(root)?;
        if !persisted.is_file() {
            return Ok(scanned);
        }

        let stored = Self::load(persisted)?;
        if stored != scanned {
            return Err(SynthError::Configuration(format!(
                "class folders {:?} under {} differ from persisted map {:?} in {}",
                scanned.names,
                root.display(),
                stored.names,
                persisted.display()
            )));
        }
        log::info!("Reusing class map from {}", persisted.display());
        Ok(stored)
    }

    /// Загрузка из JSON
    pub fn load(path: &Path) -> Result<Self, SynthError> {
        let raw = fs::read_to_string(path).map_err(|source| SynthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let map: ClassMap = serde_json::from_str(&raw)?;
        // Сохранённая карта могла быть отредактирована вручную
        let normalized = Self::from_names(map.names.clone());
        if normalized != map {
            return Err(SynthError::Configuration(format!(
                "class map {} is not sorted or has duplicates",
                path.display()
            )));
        }
        Ok(map)
    }

    /// Сохранение в JSON
    pub fn save(&self, path: &Path) -> Result<(), SynthError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| SynthError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.names.binary_search_by(|n| n.as_str().cmp(name)).ok()
    }

    pub fn name_of(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Пары (ID, имя) в порядке ID
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().enumerate().map(|(id, n)| (id, n.as_str()))
    }
}
