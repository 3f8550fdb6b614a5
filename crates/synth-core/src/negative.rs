//! Модуль негативных примеров
//!
//! Изображения без размеченного объекта: чистые обои или обои с
//! дистрактором. Тот же примитив наложения дистрактора используется для
//! "шума" позади цели в позитивных примерах.

use image::RgbaImage;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::compositor::Compositor;
use crate::crop::random_crop;
use crate::geometry::GeometryError;
use crate::placement::{Placement, PlacementSampler};

/// Режим генерации негатива
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NegativeMode {
    /// Нетронутый фон
    Plain,
    /// Фон с одним дистрактором
    #[default]
    DistractorOnly,
}

/// Конфигурация негативов
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegativeConfig {
    pub mode: NegativeMode,
    /// Количество негативов в обучающей выборке
    pub train_count: usize,
    /// Количество негативов в тестовой выборке
    pub test_count: usize,
    /// Вероятность кропа дистрактора
    pub distractor_crop_probability: f64,
    /// Минимальная доля дистрактора при кропе
    pub distractor_crop_ratio: f64,
}

impl Default for NegativeConfig {
    fn default() -> Self {
        Self {
            mode: NegativeMode::DistractorOnly,
            train_count: 500,
            test_count: 50,
            distractor_crop_probability: 0.5,
            distractor_crop_ratio: 0.4,
        }
    }
}

/// Конфигурация фонового шума (дистрактор позади цели)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub enabled: bool,
    pub probability: f64,
    pub scale_min: f64,
    pub scale_max: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probability: 0.3,
            scale_min: 0.4,
            scale_max: 0.9,
        }
    }
}

impl NoiseConfig {
    pub fn should_add<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.enabled && rng.gen_bool(self.probability.clamp(0.0, 1.0))
    }
}

/// Наложение дистрактора на копию фона (без разметки).
///
/// `scale` - диапазон масштаба; `None` - диапазон из конфигурации сэмплера.
pub fn paste_distractor<R: Rng + ?Sized>(
    background: &RgbaImage,
    distractor: &RgbaImage,
    sampler: &PlacementSampler,
    compositor: &Compositor,
    scale: Option<(f64, f64)>,
    rng: &mut R,
) -> Result<(RgbaImage, Placement), GeometryError> {
    let (bw, bh) = background.dimensions();
    let (dw, dh) = distractor.dimensions();
    let placement = match scale {
        Some((lo, hi)) => sampler.sample_in_range(bw, bh, dw, dh, lo, hi, rng)?,
        None => sampler.sample(bw, bh, dw, dh, rng)?,
    };
    Ok((compositor.paste(background, distractor, &placement), placement))
}

/// Генератор негативов
#[derive(Debug, Clone)]
pub struct NegativeGenerator {
    config: NegativeConfig,
    sampler: PlacementSampler,
    compositor: Compositor,
}

impl NegativeGenerator {
    pub fn new(config: NegativeConfig, sampler: PlacementSampler, compositor: Compositor) -> Self {
        Self {
            config,
            sampler,
            compositor,
        }
    }

    pub fn config(&self) -> &NegativeConfig {
        &self.config
    }

    /// Режим с учётом наличия дистракторов
    pub fn effective_mode(&self, has_distractors: bool) -> NegativeMode {
        match self.config.mode {
            NegativeMode::DistractorOnly if !has_distractors => NegativeMode::Plain,
            mode => mode,
        }
    }

    /// Негатив из фона; `distractor` обязателен только для `DistractorOnly`.
    ///
    /// Разметка у негатива всегда пустая, поэтому возвращается только
    /// изображение.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        background: &RgbaImage,
        distractor: Option<&RgbaImage>,
        rng: &mut R,
    ) -> Result<RgbaImage, GeometryError> {
        match (self.effective_mode(distractor.is_some()), distractor) {
            (NegativeMode::DistractorOnly, Some(distractor)) => {
                let crop_p = self.config.distractor_crop_probability.clamp(0.0, 1.0);
                let cropped;
                let source = if rng.gen_bool(crop_p) {
                    cropped = random_crop(distractor, self.config.distractor_crop_ratio, rng)?;
                    &cropped
                } else {
                    distractor
                };
                let (image, placement) =
                    paste_distractor(background, source, &self.sampler, &self.compositor, None, rng)?;
                log::trace!("Distractor negative at {:?}", placement);
                Ok(image)
            }
            _ => Ok(background.clone()),
        }
    }
}
