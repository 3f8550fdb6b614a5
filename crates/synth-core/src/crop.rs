//! Модуль кроп-аугментации
//!
//! Частично видимые окна: случайная под-область источника, не меньше
//! заданной доли ширины и высоты.

use image::imageops;
use image::RgbaImage;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::geometry::GeometryError;

/// Конфигурация кропа
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    /// Включить кроп
    pub enabled: bool,
    /// Минимальная сохраняемая доля ширины и высоты, (0, 1)
    pub min_ratio: f64,
    /// Вероятность кропа для реплики
    pub probability: f64,
    /// Нулевая реплика каждого окна всегда целая
    pub keep_first_full: bool,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_ratio: 0.4,
            probability: 1.0,
            keep_first_full: true,
        }
    }
}

impl CropConfig {
    /// Нужно ли кропать реплику с данным индексом
    pub fn should_crop<R: Rng + ?Sized>(&self, replica: u32, rng: &mut R) -> bool {
        if !self.enabled || (self.keep_first_full && replica == 0) {
            return false;
        }
        rng.gen_bool(self.probability.clamp(0.0, 1.0))
    }
}

/// Случайный кроп.
///
/// Если источник меньше минимального размера кропа хотя бы по одной оси,
/// возвращается неизменённая копия.
pub fn random_crop<R: Rng + ?Sized>(
    img: &RgbaImage,
    min_ratio: f64,
    rng: &mut R,
) -> Result<RgbaImage, GeometryError> {
    if !(min_ratio > 0.0 && min_ratio < 1.0) {
        return Err(GeometryError::InvalidRatio(min_ratio));
    }

    let (width, height) = img.dimensions();
    let min_w = (f64::from(width) * min_ratio).ceil().max(1.0) as u32;
    let min_h = (f64::from(height) * min_ratio).ceil().max(1.0) as u32;

    if min_w >= width || min_h >= height {
        log::trace!("Crop skipped for {}x{} source", width, height);
        return Ok(img.clone());
    }

    let crop_w = rng.gen_range(min_w..=width);
    let crop_h = rng.gen_range(min_h..=height);
    let x = rng.gen_range(0..=width - crop_w);
    let y = rng.gen_range(0..=height - crop_h);

    Ok(imageops::crop_imm(img, x, y, crop_w, crop_h).to_image())
}
