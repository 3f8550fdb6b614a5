//! Модуль загрузки изображений
//!
//! Перечисление файлов изображений в каталоге и общий кэш декодированных
//! источников (окна и дистракторы читаются многократно).

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::SynthError;

/// Допустимые расширения (сравнение без учёта регистра)
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Проверка расширения файла
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Список изображений в каталоге (без рекурсии), отсортированный по пути.
///
/// Отсутствующий каталог даёт пустой список.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, SynthError> {
    if !dir.is_dir() {
        log::debug!("Image directory {:?} missing, treating as empty", dir);
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|source| SynthError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut images: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_image_path(path))
        .collect();

    // Порядок read_dir не определён; сортировка нужна для воспроизводимости
    images.sort();
    Ok(images)
}

/// Декодирование файла в RGBA
pub fn load_rgba(path: &Path) -> Result<RgbaImage, SynthError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|source| SynthError::SourceDecode {
            path: path.to_path_buf(),
            source,
        })
}

/// Кэш декодированных источников.
///
/// Хранит удачно декодированные изображения и помнит пути, которые
/// декодировать не удалось, чтобы не повторять попытку в том же прогоне.
///
/// Для источников с известным числом использований (окна) кэш держит
/// изображение только до последнего запланированного использования:
/// [`SourceCache::reserve`] задаёт счётчик, [`SourceCache::release`]
/// уменьшает его и выбрасывает изображение на нуле.
#[derive(Default)]
pub struct SourceCache {
    images: Mutex<HashMap<PathBuf, Arc<RgbaImage>>>,
    remaining: Mutex<HashMap<PathBuf, usize>>,
    failed: Mutex<HashSet<PathBuf>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Получение изображения из кэша или с диска
    pub fn get(&self, path: &Path) -> Result<Arc<RgbaImage>, SynthError> {
        if let Some(img) = self.images.lock().get(path) {
            return Ok(Arc::clone(img));
        }
        if self.failed.lock().contains(path) {
            return Err(SynthError::KnownBadSource(path.to_path_buf()));
        }

        // Декодирование без удержания блокировки
        match load_rgba(path) {
            Ok(img) => {
                let img = Arc::new(img);
                self.images
                    .lock()
                    .entry(path.to_path_buf())
                    .or_insert_with(|| Arc::clone(&img));
                Ok(img)
            }
            Err(e) => {
                self.failed.lock().insert(path.to_path_buf());
                Err(e)
            }
        }
    }

    /// Однократное чтение без сохранения (фоны слишком велики для кэша)
    pub fn load_uncached(&self, path: &Path) -> Result<RgbaImage, SynthError> {
        if self.failed.lock().contains(path) {
            return Err(SynthError::KnownBadSource(path.to_path_buf()));
        }
        load_rgba(path).map_err(|e| {
            self.failed.lock().insert(path.to_path_buf());
            e
        })
    }

    /// Добавление `uses` запланированных использований источника
    pub fn reserve(&self, path: &Path, uses: usize) {
        if uses > 0 {
            *self.remaining.lock().entry(path.to_path_buf()).or_default() += uses;
        }
    }

    /// Одно использование завершено; на последнем изображение выгружается
    pub fn release(&self, path: &Path) {
        let mut remaining = self.remaining.lock();
        let Some(count) = remaining.get_mut(path) else {
            return;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            remaining.remove(path);
            if self.images.lock().remove(path).is_some() {
                log::trace!("Evicted {}", path.display());
            }
        }
    }

    /// Выгрузка всех изображений (список сбойных путей сохраняется)
    pub fn clear(&self) {
        self.images.lock().clear();
        self.remaining.lock().clear();
    }

    /// Число изображений, удерживаемых в памяти
    pub fn cached_count(&self) -> usize {
        self.images.lock().len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.lock().len()
    }
}

/// Набор изображений одной роли (фоны, дистракторы)
#[derive(Debug, Clone, Default)]
pub struct ImageSet {
    paths: Vec<PathBuf>,
}

impl ImageSet {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// Загрузка набора из каталога
    pub fn from_dir(dir: &Path) -> Result<Self, SynthError> {
        Ok(Self::new(list_images(dir)?))
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Равномерный выбор пути
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Path> {
        self.paths.choose(rng).map(PathBuf::as_path)
    }
}
