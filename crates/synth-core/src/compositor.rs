//! Модуль композитинга
//!
//! Ресайз окна и альфа-наложение на копию фона. Исходные буферы никогда
//! не изменяются: один и тот же фон проходит через несколько наложений.

use image::buffer::ConvertBuffer;
use image::imageops::{self, FilterType};
use image::{RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::placement::Placement;

/// Фильтр ресайза (сериализуемая обёртка над `FilterType`)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    #[default]
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Композитор
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    filter: ResizeFilter,
}

impl Compositor {
    /// Создание композитора с фильтром ресайза
    pub fn new(filter: ResizeFilter) -> Self {
        Self { filter }
    }

    /// Ресайз до точного размера (без ресайза, если размер уже совпадает)
    pub fn resize(&self, img: &RgbaImage, width: u32, height: u32) -> RgbaImage {
        if img.dimensions() == (width, height) {
            return img.clone();
        }
        imageops::resize(img, width, height, self.filter.into())
    }

    /// Наложение окна на копию фона по результату размещения
    pub fn paste(
        &self,
        background: &RgbaImage,
        foreground: &RgbaImage,
        placement: &Placement,
    ) -> RgbaImage {
        let resized = self.resize(foreground, placement.width, placement.height);
        let mut canvas = background.clone();
        imageops::overlay(
            &mut canvas,
            &resized,
            i64::from(placement.x),
            i64::from(placement.y),
        );
        canvas
    }

    /// Наложение уже отресайженного слоя на месте; координаты могут
    /// выходить за холст, лишнее отсекается
    pub fn overlay_in_place(&self, canvas: &mut RgbaImage, layer: &RgbaImage, x: i64, y: i64) {
        imageops::overlay(canvas, layer, x, y);
    }

    /// RGB для JPEG: альфа-канал отбрасывается, цвет сохраняется
    pub fn flatten(&self, img: &RgbaImage) -> RgbImage {
        img.convert()
    }
}
