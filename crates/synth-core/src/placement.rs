//! Модуль размещения переднего плана
//!
//! Выбор размера (с сохранением пропорций) и позиции окна на обоях так,
//! чтобы прямоугольник целиком лежал внутри фона.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::geometry::{round_u32, BoundingBox, GeometryError};

/// Доля высоты фона, которую окно не может превысить
pub const MAX_HEIGHT_FRACTION: f64 = 0.95;

/// Способ выбора размера
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlacementMode {
    /// Ширина = случайная доля ширины фона, высота по пропорциям
    #[default]
    Scaled,
    /// Исходный размер; уменьшение только если окно больше фона
    Fit,
}

/// Конфигурация размещения
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub mode: PlacementMode,
    /// Минимальная доля ширины фона
    pub scale_min: f64,
    /// Максимальная доля ширины фона
    pub scale_max: f64,
    /// Ограничение высоты (доля высоты фона)
    pub max_height_fraction: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            mode: PlacementMode::Scaled,
            scale_min: 0.5,
            scale_max: 0.8,
            max_height_fraction: MAX_HEIGHT_FRACTION,
        }
    }
}

/// Результат размещения: размер после ресайза и левый верхний угол
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

impl Placement {
    /// Bounding box размещения на фоне заданного размера
    pub fn bbox(&self, bg_width: u32, bg_height: u32) -> Result<BoundingBox, GeometryError> {
        BoundingBox::from_origin(self.x, self.y, self.width, self.height, bg_width, bg_height)
    }
}

/// Сэмплер размещения
#[derive(Debug, Clone)]
pub struct PlacementSampler {
    config: PlacementConfig,
}

impl Default for PlacementSampler {
    fn default() -> Self {
        Self::new(PlacementConfig::default())
    }
}

impl PlacementSampler {
    /// Создание сэмплера
    pub fn new(config: PlacementConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// Размещение с диапазоном масштаба из конфигурации
    pub fn sample<R: Rng + ?Sized>(
        &self,
        bg_width: u32,
        bg_height: u32,
        fg_width: u32,
        fg_height: u32,
        rng: &mut R,
    ) -> Result<Placement, GeometryError> {
        self.sample_in_range(
            bg_width,
            bg_height,
            fg_width,
            fg_height,
            self.config.scale_min,
            self.config.scale_max,
            rng,
        )
    }

    /// Размещение с явным диапазоном масштаба (фоновый шум использует свой)
    #[allow(clippy::too_many_arguments)]
    pub fn sample_in_range<R: Rng + ?Sized>(
        &self,
        bg_width: u32,
        bg_height: u32,
        fg_width: u32,
        fg_height: u32,
        scale_min: f64,
        scale_max: f64,
        rng: &mut R,
    ) -> Result<Placement, GeometryError> {
        let (width, height) = match self.config.mode {
            PlacementMode::Scaled => {
                if !(scale_min > 0.0 && scale_min <= scale_max && scale_max <= 1.0) {
                    return Err(GeometryError::InvalidScaleRange {
                        min: scale_min,
                        max: scale_max,
                    });
                }
                let scale = rng.gen_range(scale_min..=scale_max);
                self.scaled_size(bg_width, bg_height, fg_width, fg_height, scale)?
            }
            PlacementMode::Fit => fit_size(
                bg_width,
                bg_height,
                fg_width,
                fg_height,
                self.config.max_height_fraction,
            )?,
        };

        let (x, y) = random_offset(bg_width, bg_height, width, height, rng);
        let placement = Placement { width, height, x, y };

        // Итоговый прямоугольник обязан лежать внутри фона
        placement.bbox(bg_width, bg_height)?;
        Ok(placement)
    }

    /// Размер окна для фиксированного масштаба.
    ///
    /// Высота - связывающее ограничение: при переполнении высота
    /// пересчитывается от фона, ширина - от высоты, и больше не трогается.
    pub fn scaled_size(
        &self,
        bg_width: u32,
        bg_height: u32,
        fg_width: u32,
        fg_height: u32,
        scale: f64,
    ) -> Result<(u32, u32), GeometryError> {
        if fg_width == 0 || fg_height == 0 {
            return Err(GeometryError::DegenerateSource {
                width: fg_width,
                height: fg_height,
            });
        }
        let aspect = f64::from(fg_width) / f64::from(fg_height);

        let mut new_w = round_u32(f64::from(bg_width) * scale);
        let mut new_h = round_u32(f64::from(new_w) / aspect);

        let height_cap = f64::from(bg_height) * self.config.max_height_fraction;
        if f64::from(new_h) > height_cap {
            new_h = round_u32(height_cap);
            new_w = round_u32(f64::from(new_h) * aspect);
            log::trace!("Height clamp: {}x{} on {}x{}", new_w, new_h, bg_width, bg_height);
        }

        if new_w == 0 || new_h == 0 {
            return Err(GeometryError::DegenerateOutput {
                width: new_w,
                height: new_h,
                scale,
            });
        }
        Ok((new_w, new_h))
    }
}

/// Исходный размер; окно, которое не помещается, уменьшается до
/// `max_fraction` фона по связывающей стороне
pub fn fit_size(
    bg_width: u32,
    bg_height: u32,
    fg_width: u32,
    fg_height: u32,
    max_fraction: f64,
) -> Result<(u32, u32), GeometryError> {
    if fg_width == 0 || fg_height == 0 {
        return Err(GeometryError::DegenerateSource {
            width: fg_width,
            height: fg_height,
        });
    }
    if fg_width <= bg_width && fg_height <= bg_height {
        return Ok((fg_width, fg_height));
    }

    let factor = (f64::from(bg_width) / f64::from(fg_width))
        .min(f64::from(bg_height) / f64::from(fg_height))
        * max_fraction;
    let new_w = round_u32(f64::from(fg_width) * factor);
    let new_h = round_u32(f64::from(fg_height) * factor);

    if new_w == 0 || new_h == 0 {
        return Err(GeometryError::DegenerateOutput {
            width: new_w,
            height: new_h,
            scale: factor,
        });
    }
    Ok((new_w, new_h))
}

/// Равномерный левый верхний угол; пустой диапазон схлопывается в 0
pub fn random_offset<R: Rng + ?Sized>(
    bg_width: u32,
    bg_height: u32,
    width: u32,
    height: u32,
    rng: &mut R,
) -> (u32, u32) {
    let max_x = bg_width.saturating_sub(width);
    let max_y = bg_height.saturating_sub(height);
    (rng.gen_range(0..=max_x), rng.gen_range(0..=max_y))
}
