//! Synth Core - Модуль синтеза датасетов для детекции окон
//!
//! Библиотека для генерации размеченных изображений: вырезанные окна
//! приложений накладываются на обои со случайными масштабом, позицией и
//! перекрытием. Поддерживается:
//! - Детерминированное назначение ID классов по именам каталогов
//! - Размещение с сохранением пропорций и ограничением по высоте
//! - Перекрытие цели дистрактором и фоновый шум позади цели
//! - Кроп-аугментация и негативные примеры
//! - Разметка в нормализованном YOLO-формате и манифест `data.yaml`
//! - Параллельная генерация с воспроизводимостью по seed

pub mod annotation;
pub mod compositor;
pub mod config;
pub mod crop;
pub mod dataset;
pub mod generator;
pub mod geometry;
pub mod loader;
pub mod manifest;
pub mod negative;
pub mod occlusion;
pub mod pipeline;
pub mod placement;
pub mod registry;
pub mod validate;

pub use annotation::{Annotation, AnnotationError};
pub use compositor::{Compositor, ResizeFilter};
pub use config::{GenerationConfig, PartitionSelection, ReplicaCount};
pub use crop::CropConfig;
pub use dataset::{Category, DatasetLayout, Partition, PartitionSplit};
pub use generator::{CancelToken, Counts, DatasetGenerator, RunSummary};
pub use geometry::{BoundingBox, GeometryError, Rect};
pub use loader::{ImageSet, SourceCache};
pub use manifest::DatasetManifest;
pub use negative::{NegativeConfig, NegativeGenerator, NegativeMode, NoiseConfig};
pub use occlusion::{Occluder, OcclusionConfig};
pub use placement::{Placement, PlacementConfig, PlacementMode, PlacementSampler};
pub use registry::ClassMap;
pub use validate::{render_overlay, verify_dataset, VerifyReport, Violation};

use std::path::PathBuf;

use thiserror::Error;

/// Основные ошибки модуля
#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Failed to decode {path:?}: {source}")]
    SourceDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Source {0:?} failed to decode earlier in this run")]
    KnownBadSource(PathBuf),

    #[error("Annotation error: {0}")]
    Annotation(#[from] AnnotationError),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_yml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SynthError {
    /// Ошибка одного примера: пример пропускается, прогон продолжается
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SynthError::Geometry(_)
                | SynthError::SourceDecode { .. }
                | SynthError::KnownBadSource(_)
                | SynthError::Encode { .. }
        )
    }
}
