//! Модуль конвейера одного примера
//!
//! Последовательность стадий для позитивного примера:
//! `SELECT_SOURCES -> CROP? -> PLACE -> PRE_NOISE? -> PASTE -> OCCLUDE? -> ENCODE -> WRITE`.
//! Негатив проходит `SELECT_SOURCES -> PASTE -> WRITE`. Любая ошибка стадии
//! завершает пример, но не прогон.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::RgbaImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::annotation::{write_label, Annotation};
use crate::compositor::Compositor;
use crate::config::GenerationConfig;
use crate::crop::{random_crop, CropConfig};
use crate::dataset::{Category, DatasetLayout, Partition};
use crate::geometry::{BoundingBox, Rect};
use crate::loader::{ImageSet, SourceCache};
use crate::negative::{paste_distractor, NegativeGenerator, NegativeMode, NoiseConfig};
use crate::occlusion::Occluder;
use crate::placement::PlacementSampler;
use crate::SynthError;

/// Что генерирует задача
#[derive(Debug, Clone, PartialEq)]
pub enum SampleKind {
    Positive {
        class_id: usize,
        class_name: String,
        foreground: PathBuf,
        /// Номер реплики окна (0 - первая)
        replica: u32,
    },
    Negative,
}

/// Задача генерации: всё, что нужно примеру, решено заранее
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTask {
    pub partition: Partition,
    /// Имя без расширения, общее для изображения и разметки
    pub name: String,
    pub background: PathBuf,
    pub kind: SampleKind,
    /// Seed собственного генератора задачи
    pub seed: u64,
}

impl SampleTask {
    pub fn category(&self) -> Category {
        match self.kind {
            SampleKind::Positive { .. } => Category::Positive,
            SampleKind::Negative => Category::Negative,
        }
    }
}

/// Стадия конвейера
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SelectSources,
    Crop,
    Place,
    PreNoise,
    Paste,
    Occlude,
    Encode,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::SelectSources => "SELECT_SOURCES",
            Stage::Crop => "CROP",
            Stage::Place => "PLACE",
            Stage::PreNoise => "PRE_NOISE",
            Stage::Paste => "PASTE",
            Stage::Occlude => "OCCLUDE",
            Stage::Encode => "ENCODE",
            Stage::Write => "WRITE",
        })
    }
}

/// Ошибка примера с указанием стадии
#[derive(Debug)]
pub struct SampleFailure {
    pub stage: Stage,
    pub error: SynthError,
}

impl fmt::Display for SampleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.error)
    }
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, SampleFailure>;
}

impl<T, E: Into<SynthError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, SampleFailure> {
        self.map_err(|e| SampleFailure {
            stage,
            error: e.into(),
        })
    }
}

/// Собранный позитивный пример
struct Composite {
    image: RgbaImage,
    annotation: Annotation,
    /// Box цели при размещении
    target: BoundingBox,
    occluder: Option<Rect>,
}

/// Движок: один параметризованный конвейер для всех вариантов генерации
pub struct SampleEngine {
    layout: DatasetLayout,
    cache: SourceCache,
    sampler: PlacementSampler,
    compositor: Compositor,
    occluder: Occluder,
    negatives: NegativeGenerator,
    crop: CropConfig,
    noise: NoiseConfig,
    jpeg_quality: u8,
}

impl SampleEngine {
    pub fn new(config: &GenerationConfig, layout: DatasetLayout) -> Self {
        let sampler = PlacementSampler::new(config.placement.clone());
        let compositor = Compositor::new(config.resize_filter);
        Self {
            layout,
            cache: SourceCache::new(),
            occluder: Occluder::new(config.occlusion.clone(), compositor.clone()),
            negatives: NegativeGenerator::new(
                config.negatives.clone(),
                sampler.clone(),
                compositor.clone(),
            ),
            sampler,
            compositor,
            crop: config.crop.clone(),
            noise: config.noise.clone(),
            jpeg_quality: config.jpeg_quality,
        }
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    pub fn cache(&self) -> &SourceCache {
        &self.cache
    }

    /// Регистрация запланированных использований окон, чтобы кэш выгружал
    /// каждое окно после его последней задачи
    pub fn reserve(&self, tasks: &[SampleTask]) {
        for task in tasks {
            if let SampleKind::Positive { foreground, .. } = &task.kind {
                self.cache.reserve(foreground, 1);
            }
        }
    }

    /// Выполнение задачи. Возвращает записанную аннотацию (`None` для негатива).
    pub fn run(
        &self,
        task: &SampleTask,
        distractors: &ImageSet,
    ) -> Result<Option<Annotation>, SampleFailure> {
        let result = self.run_task(task, distractors);
        if let SampleKind::Positive { foreground, .. } = &task.kind {
            self.cache.release(foreground);
        }
        result
    }

    fn run_task(
        &self,
        task: &SampleTask,
        distractors: &ImageSet,
    ) -> Result<Option<Annotation>, SampleFailure> {
        let mut rng = StdRng::seed_from_u64(task.seed);
        let background = self
            .cache
            .load_uncached(&task.background)
            .at(Stage::SelectSources)?;

        match &task.kind {
            SampleKind::Positive {
                class_id,
                foreground,
                replica,
                ..
            } => {
                let composite = self.positive(
                    background,
                    *class_id,
                    foreground,
                    *replica,
                    distractors,
                    &mut rng,
                )?;
                let annotation = composite.annotation;
                self.write_sample(task.partition, &composite.image, &task.name, Some(&annotation))
                    .at(Stage::Write)?;
                log::debug!(
                    "{} {} written: {} (target {:?}, occluder {:?})",
                    task.partition,
                    task.name,
                    annotation.to_line(),
                    composite.target,
                    composite.occluder
                );
                Ok(Some(annotation))
            }
            SampleKind::Negative => {
                let distractor = match self.negatives.effective_mode(!distractors.is_empty()) {
                    NegativeMode::DistractorOnly => self
                        .pick_distractor(distractors, &mut rng)
                        .transpose()
                        .at(Stage::SelectSources)?,
                    NegativeMode::Plain => None,
                };
                let image = self
                    .negatives
                    .generate(&background, distractor.as_deref(), &mut rng)
                    .at(Stage::Paste)?;
                self.write_sample(task.partition, &image, &task.name, None)
                    .at(Stage::Write)?;
                log::debug!("{} {} written (negative)", task.partition, task.name);
                Ok(None)
            }
        }
    }

    fn positive(
        &self,
        background: RgbaImage,
        class_id: usize,
        foreground: &Path,
        replica: u32,
        distractors: &ImageSet,
        rng: &mut StdRng,
    ) -> Result<Composite, SampleFailure> {
        let source = self.cache.get(foreground).at(Stage::SelectSources)?;

        let cropped;
        let target: &RgbaImage = if self.crop.should_crop(replica, rng) {
            cropped = random_crop(&source, self.crop.min_ratio, rng).at(Stage::Crop)?;
            &cropped
        } else {
            &source
        };

        let (bw, bh) = background.dimensions();
        let (fw, fh) = target.dimensions();
        let placement = self.sampler.sample(bw, bh, fw, fh, rng).at(Stage::Place)?;
        let bbox = placement.bbox(bw, bh).at(Stage::Place)?;

        // Шум кладётся до цели, чтобы цель оказалась поверх
        let noise = if self.noise.should_add(rng) {
            self.pick_distractor(distractors, rng)
        } else {
            None
        };
        let base = match noise {
            Some(distractor) => {
                let distractor = distractor.at(Stage::PreNoise)?;
                let (noisy, _) = paste_distractor(
                    &background,
                    &distractor,
                    &self.sampler,
                    &self.compositor,
                    Some((self.noise.scale_min, self.noise.scale_max)),
                    rng,
                )
                .at(Stage::PreNoise)?;
                noisy
            }
            None => background,
        };

        let mut canvas = self.compositor.paste(&base, target, &placement);

        let mut occluder = None;
        if self.occluder.should_occlude(rng) {
            if let Some(distractor) = self.pick_distractor(distractors, rng) {
                let distractor = distractor.at(Stage::Occlude)?;
                occluder = Some(
                    self.occluder
                        .occlude(&mut canvas, &bbox, &distractor, rng)
                        .at(Stage::Occlude)?,
                );
            }
        }

        // Разметка - геометрия до перекрытия
        let annotation = Annotation::from_bbox(class_id, bw, bh, &bbox).at(Stage::Encode)?;
        Ok(Composite {
            image: canvas,
            annotation,
            target: bbox,
            occluder,
        })
    }

    fn pick_distractor(
        &self,
        distractors: &ImageSet,
        rng: &mut StdRng,
    ) -> Option<Result<Arc<RgbaImage>, SynthError>> {
        distractors.choose(rng).map(|path| self.cache.get(path))
    }

    /// Запись пары: сначала изображение, затем разметка.
    ///
    /// JPEG пишется во временный файл и переименовывается; при ошибке
    /// записи разметки изображение удаляется, пара не остаётся неполной.
    fn write_sample(
        &self,
        partition: Partition,
        image: &RgbaImage,
        name: &str,
        annotation: Option<&Annotation>,
    ) -> Result<(), SynthError> {
        let image_path = self.layout.image_path(partition, name);
        let label_path = self.layout.label_path(partition, name);
        let partial = image_path.with_extension("jpg.part");

        let rgb = self.compositor.flatten(image);
        let written = File::create(&partial)
            .map_err(|source| SynthError::Io {
                path: partial.clone(),
                source,
            })
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality)
                    .encode_image(&rgb)
                    .map_err(|source| SynthError::Encode {
                        path: image_path.clone(),
                        source,
                    })?;
                writer.flush().map_err(|source| SynthError::Io {
                    path: partial.clone(),
                    source,
                })
            });
        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }

        fs::rename(&partial, &image_path).map_err(|source| SynthError::Io {
            path: image_path.clone(),
            source,
        })?;

        write_label(&label_path, annotation).map_err(|source| {
            let _ = fs::remove_file(&image_path);
            SynthError::Io {
                path: label_path.clone(),
                source,
            }
        })
    }
}

/// Seed задачи из генератора прогона
pub fn next_task_seed<R: Rng + ?Sized>(rng: &mut R) -> u64 {
    rng.gen()
}
