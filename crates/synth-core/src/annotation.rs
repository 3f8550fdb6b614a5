//! Модуль аннотаций
//!
//! Перевод пиксельного bounding box в нормализованный YOLO-формат
//! (center-x, center-y, width, height) и запись файла разметки.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{round_u32, BoundingBox};

/// Ошибки аннотаций
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnnotationError {
    #[error("Box {bbox:?} violates bounds of {width}x{height} image")]
    OutOfBounds {
        bbox: BoundingBox,
        width: u32,
        height: u32,
    },

    #[error("Image has zero area: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    #[error("Malformed label line: {0}")]
    Malformed(String),
}

/// Нормализованная аннотация одного объекта
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub class_id: usize,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Annotation {
    /// Аннотация из пиксельного box
    pub fn from_bbox(
        class_id: usize,
        img_width: u32,
        img_height: u32,
        bbox: &BoundingBox,
    ) -> Result<Self, AnnotationError> {
        let (center_x, center_y, width, height) = encode(img_width, img_height, bbox)?;
        Ok(Self {
            class_id,
            center_x,
            center_y,
            width,
            height,
        })
    }

    /// Строка разметки: `<class_id> <cx> <cy> <w> <h>` с шестью знаками
    pub fn to_line(&self) -> String {
        format!(
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.center_x, self.center_y, self.width, self.height
        )
    }

    /// Разбор строки разметки
    pub fn parse_line(line: &str) -> Result<Self, AnnotationError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(AnnotationError::Malformed(line.to_string()));
        }
        let class_id = parts[0]
            .parse::<usize>()
            .map_err(|_| AnnotationError::Malformed(line.to_string()))?;

        let mut values = [0.0f64; 4];
        for (slot, raw) in values.iter_mut().zip(&parts[1..]) {
            *slot = raw
                .parse::<f64>()
                .map_err(|_| AnnotationError::Malformed(line.to_string()))?;
            if !(0.0..=1.0).contains(slot) {
                return Err(AnnotationError::Malformed(line.to_string()));
            }
        }

        Ok(Self {
            class_id,
            center_x: values[0],
            center_y: values[1],
            width: values[2],
            height: values[3],
        })
    }

    /// Обратное преобразование в пиксели (с точностью до округления)
    pub fn to_bbox(&self, img_width: u32, img_height: u32) -> Result<BoundingBox, AnnotationError> {
        decode(
            img_width,
            img_height,
            (self.center_x, self.center_y, self.width, self.height),
        )
    }
}

/// Нормализация box: все величины делятся на размеры изображения.
///
/// Значения не обрезаются: box вне изображения - ошибка размещения выше
/// по конвейеру.
pub fn encode(
    img_width: u32,
    img_height: u32,
    bbox: &BoundingBox,
) -> Result<(f64, f64, f64, f64), AnnotationError> {
    if img_width == 0 || img_height == 0 {
        return Err(AnnotationError::EmptyImage {
            width: img_width,
            height: img_height,
        });
    }
    if !bbox.fits_within(img_width, img_height) {
        return Err(AnnotationError::OutOfBounds {
            bbox: *bbox,
            width: img_width,
            height: img_height,
        });
    }

    let iw = f64::from(img_width);
    let ih = f64::from(img_height);
    let bw = f64::from(bbox.width());
    let bh = f64::from(bbox.height());
    let cx = f64::from(bbox.x_min) + bw / 2.0;
    let cy = f64::from(bbox.y_min) + bh / 2.0;

    Ok((cx / iw, cy / ih, bw / iw, bh / ih))
}

/// Нормализованный кортеж обратно в пиксельный box
pub fn decode(
    img_width: u32,
    img_height: u32,
    (cx, cy, w, h): (f64, f64, f64, f64),
) -> Result<BoundingBox, AnnotationError> {
    let iw = f64::from(img_width);
    let ih = f64::from(img_height);
    let x_min = round_u32((cx - w / 2.0) * iw);
    let y_min = round_u32((cy - h / 2.0) * ih);
    let x_max = round_u32((cx + w / 2.0) * iw);
    let y_max = round_u32((cy + h / 2.0) * ih);

    BoundingBox::new(x_min, y_min, x_max, y_max, img_width, img_height).map_err(|_| {
        AnnotationError::Malformed(format!("{cx} {cy} {w} {h} on {img_width}x{img_height}"))
    })
}

/// Запись файла разметки: одна строка или пустой файл для негативов
pub fn write_label(path: &Path, annotation: Option<&Annotation>) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    if let Some(annotation) = annotation {
        writeln!(file, "{}", annotation.to_line())?;
    }
    file.flush()
}

/// Чтение файла разметки (не более одной строки)
pub fn read_label(path: &Path) -> Result<Option<Annotation>, AnnotationError> {
    let content = fs::read_to_string(path)
        .map_err(|e| AnnotationError::Malformed(format!("{}: {e}", path.display())))?;
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    match lines.as_slice() {
        [] => Ok(None),
        [line] => Annotation::parse_line(line).map(Some),
        _ => Err(AnnotationError::Malformed(format!(
            "{}: {} lines in single-object label",
            path.display(),
            lines.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_reference_box() {
        let bbox = BoundingBox::new(0, 0, 960, 640, 1920, 1080).unwrap();
        let annotation = Annotation::from_bbox(2, 1920, 1080, &bbox).unwrap();

        assert_eq!(annotation.to_line(), "2 0.250000 0.296296 0.500000 0.592593");
    }

    #[test]
    fn test_encode_rejects_foreign_box() {
        // Box построен для большего изображения
        let bbox = BoundingBox::new(0, 0, 200, 200, 300, 300).unwrap();
        assert!(matches!(
            encode(100, 100, &bbox),
            Err(AnnotationError::OutOfBounds { .. })
        ));
        assert!(matches!(
            encode(0, 100, &bbox),
            Err(AnnotationError::EmptyImage { .. })
        ));
    }

    #[test]
    fn test_decode_roundtrip() {
        let bbox = BoundingBox::new(13, 27, 411, 390, 640, 480).unwrap();
        let line = Annotation::from_bbox(0, 640, 480, &bbox).unwrap().to_line();
        let back = Annotation::parse_line(&line).unwrap().to_bbox(640, 480).unwrap();

        assert!(back.x_min.abs_diff(bbox.x_min) <= 1);
        assert!(back.y_min.abs_diff(bbox.y_min) <= 1);
        assert!(back.x_max.abs_diff(bbox.x_max) <= 1);
        assert!(back.y_max.abs_diff(bbox.y_max) <= 1);
    }

    #[test]
    fn test_parse_line_errors() {
        assert!(Annotation::parse_line("0 0.5 0.5 0.5").is_err());
        assert!(Annotation::parse_line("x 0.5 0.5 0.5 0.5").is_err());
        assert!(Annotation::parse_line("0 0.5 1.5 0.5 0.5").is_err());
        assert!(Annotation::parse_line("1 0.5 0.5 0.25 0.25").is_ok());
    }
}
