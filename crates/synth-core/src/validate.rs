//! Модуль проверки датасета
//!
//! Повторное чтение записанного датасета: пары изображение/разметка,
//! формат строк, диапазон ID классов и инвариант box. Отдельно -
//! отрисовка разметки поверх изображения для визуальной проверки.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect as DrawRect;

use crate::annotation::read_label;
use crate::dataset::{DatasetLayout, Partition};
use crate::loader::list_images;
use crate::manifest::{DatasetManifest, MANIFEST_FILE};
use crate::registry::{ClassMap, CLASS_MAP_FILE};
use crate::SynthError;

/// Цвет рамки на превью
const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 64, 192]);
/// Толщина рамки в пикселях
const OVERLAY_THICKNESS: u32 = 2;

/// Нарушение формата датасета
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    MissingLabel { image: PathBuf },
    OrphanLabel { label: PathBuf },
    MalformedLabel { label: PathBuf, reason: String },
    ClassOutOfRange { label: PathBuf, class_id: usize, classes: usize },
    BoxOutOfBounds { label: PathBuf, reason: String },
    UnreadableImage { image: PathBuf, reason: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingLabel { image } => write!(f, "{}: no label", image.display()),
            Violation::OrphanLabel { label } => write!(f, "{}: no image", label.display()),
            Violation::MalformedLabel { label, reason } => {
                write!(f, "{}: malformed ({reason})", label.display())
            }
            Violation::ClassOutOfRange {
                label,
                class_id,
                classes,
            } => write!(
                f,
                "{}: class {class_id} outside 0..{classes}",
                label.display()
            ),
            Violation::BoxOutOfBounds { label, reason } => {
                write!(f, "{}: box out of bounds ({reason})", label.display())
            }
            Violation::UnreadableImage { image, reason } => {
                write!(f, "{}: unreadable ({reason})", image.display())
            }
        }
    }
}

/// Отчёт проверки
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub classes: usize,
    pub images: usize,
    pub positives: usize,
    pub negatives: usize,
    pub violations: Vec<Violation>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} images ({} positive, {} negative), {} classes, {} violations",
            self.images,
            self.positives,
            self.negatives,
            self.classes,
            self.violations.len()
        )?;
        for violation in &self.violations {
            write!(f, "\n  {violation}")?;
        }
        Ok(())
    }
}

/// Число классов: из `classes.json`, иначе из манифеста
fn class_count(root: &Path) -> Result<usize, SynthError> {
    let class_map = root.join(CLASS_MAP_FILE);
    if class_map.is_file() {
        return Ok(ClassMap::load(&class_map)?.len());
    }
    let manifest = root.join(MANIFEST_FILE);
    if manifest.is_file() {
        return Ok(DatasetManifest::load(&manifest)?.nc);
    }
    Err(SynthError::Configuration(format!(
        "{} has neither {CLASS_MAP_FILE} nor {MANIFEST_FILE}",
        root.display()
    )))
}

/// Проверка записанного датасета
pub fn verify_dataset(root: &Path) -> Result<VerifyReport, SynthError> {
    let layout = DatasetLayout::new(root);
    let mut report = VerifyReport {
        classes: class_count(root)?,
        ..VerifyReport::default()
    };

    for partition in Partition::ALL {
        let images = list_images(&layout.images_dir(partition))?;
        let mut stems = HashSet::new();

        for image in images {
            report.images += 1;
            let Some(stem) = image.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            stems.insert(stem.to_string());
            let label = layout.label_path(partition, stem);
            check_pair(&image, &label, &mut report);
        }

        // Разметка без изображения
        let labels_dir = layout.labels_dir(partition);
        if labels_dir.is_dir() {
            let entries = fs::read_dir(&labels_dir).map_err(|source| SynthError::Io {
                path: labels_dir.clone(),
                source,
            })?;
            let mut orphans: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("txt"))
                .filter(|p| {
                    p.file_stem()
                        .and_then(|s| s.to_str())
                        .map(|s| !stems.contains(s))
                        .unwrap_or(true)
                })
                .collect();
            orphans.sort();
            report
                .violations
                .extend(orphans.into_iter().map(|label| Violation::OrphanLabel { label }));
        }
    }

    log::info!("Verified {}: {}", root.display(), report);
    Ok(report)
}

fn check_pair(image: &Path, label: &Path, report: &mut VerifyReport) {
    if !label.is_file() {
        report.violations.push(Violation::MissingLabel {
            image: image.to_path_buf(),
        });
        return;
    }

    let annotation = match read_label(label) {
        Ok(Some(annotation)) => annotation,
        Ok(None) => {
            report.negatives += 1;
            return;
        }
        Err(e) => {
            report.violations.push(Violation::MalformedLabel {
                label: label.to_path_buf(),
                reason: e.to_string(),
            });
            return;
        }
    };
    report.positives += 1;

    if annotation.class_id >= report.classes {
        report.violations.push(Violation::ClassOutOfRange {
            label: label.to_path_buf(),
            class_id: annotation.class_id,
            classes: report.classes,
        });
    }

    let (width, height) = match image::image_dimensions(image) {
        Ok(dims) => dims,
        Err(e) => {
            report.violations.push(Violation::UnreadableImage {
                image: image.to_path_buf(),
                reason: e.to_string(),
            });
            return;
        }
    };
    if let Err(e) = annotation.to_bbox(width, height) {
        report.violations.push(Violation::BoxOutOfBounds {
            label: label.to_path_buf(),
            reason: e.to_string(),
        });
    }
}

/// Изображение с нарисованным box (если разметка не пустая)
pub fn render_overlay(image_path: &Path, label_path: &Path) -> Result<RgbImage, SynthError> {
    let mut canvas = image::open(image_path)
        .map_err(|source| SynthError::SourceDecode {
            path: image_path.to_path_buf(),
            source,
        })?
        .to_rgb8();

    if let Some(annotation) = read_label(label_path)? {
        let bbox = annotation.to_bbox(canvas.width(), canvas.height())?;
        for t in 0..OVERLAY_THICKNESS {
            let w = bbox.width().saturating_sub(2 * t);
            let h = bbox.height().saturating_sub(2 * t);
            if w == 0 || h == 0 {
                break;
            }
            let rect = DrawRect::at((bbox.x_min + t) as i32, (bbox.y_min + t) as i32).of_size(w, h);
            draw_hollow_rect_mut(&mut canvas, rect, OVERLAY_COLOR);
        }
    }
    Ok(canvas)
}

/// Превью для первых `limit` примеров выборки; возвращает число файлов
pub fn write_previews(
    root: &Path,
    partition: Partition,
    limit: usize,
    out_dir: &Path,
) -> Result<usize, SynthError> {
    let layout = DatasetLayout::new(root);
    fs::create_dir_all(out_dir).map_err(|source| SynthError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let mut written = 0;
    for image in list_images(&layout.images_dir(partition))?.into_iter().take(limit) {
        let Some(name) = image.file_name() else {
            continue;
        };
        let Some(stem) = image.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let overlay = match render_overlay(&image, &layout.label_path(partition, stem)) {
            Ok(overlay) => overlay,
            Err(e) => {
                log::warn!("No preview for {}: {e}", image.display());
                continue;
            }
        };
        let out = out_dir.join(name);
        overlay.save(&out).map_err(|source| SynthError::Encode { path: out, source })?;
        written += 1;
    }
    Ok(written)
}
