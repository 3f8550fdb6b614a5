//! Модуль оркестрации прогона
//!
//! Загрузка пулов, разбиение фонов, построение карты классов, планирование
//! задач в одном потоке и их параллельное выполнение. Манифест пишется
//! последним и только для завершённого прогона.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::config::{GenerationConfig, PartitionSelection};
use crate::dataset::{Category, DatasetLayout, NameAllocator, Partition, PartitionSplit};
use crate::loader::{list_images, ImageSet};
use crate::manifest::DatasetManifest;
use crate::pipeline::{next_task_seed, SampleEngine, SampleKind, SampleTask};
use crate::registry::{ClassMap, DISTRACTOR_DIR};
use crate::SynthError;

/// Кооперативная отмена: проверяется перед каждой задачей
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Итог одной задачи
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Written,
    Skipped,
    Defect,
    Cancelled,
}

/// Счётчики по выборке и категории
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub written: usize,
    pub skipped: usize,
    /// Нарушения инварианта разметки
    pub defects: usize,
    pub cancelled: usize,
}

impl Counts {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Written => self.written += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Defect => self.defects += 1,
            Outcome::Cancelled => self.cancelled += 1,
        }
    }

    fn merge(&mut self, other: &Counts) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.defects += other.defects;
        self.cancelled += other.cancelled;
    }

    pub fn total(&self) -> usize {
        self.written + self.skipped + self.defects + self.cancelled
    }
}

/// Итог прогона
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub seed: u64,
    pub classes: ClassMap,
    pub counts: BTreeMap<(Partition, Category), Counts>,
    /// Источники, которые не удалось декодировать
    pub failed_sources: usize,
    /// Путь манифеста; `None` - прогон не завершён
    pub manifest: Option<PathBuf>,
}

impl RunSummary {
    fn new(seed: u64, classes: ClassMap) -> Self {
        Self {
            seed,
            classes,
            counts: BTreeMap::new(),
            failed_sources: 0,
            manifest: None,
        }
    }

    pub fn get(&self, partition: Partition, category: Category) -> Counts {
        self.counts
            .get(&(partition, category))
            .copied()
            .unwrap_or_default()
    }

    pub fn totals(&self) -> Counts {
        let mut totals = Counts::default();
        for counts in self.counts.values() {
            totals.merge(counts);
        }
        totals
    }

    pub fn is_complete(&self) -> bool {
        self.manifest.is_some()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<10} {:<9} {:>8} {:>8} {:>8} {:>9}",
            "partition", "category", "written", "skipped", "defects", "cancelled"
        )?;
        for ((partition, category), c) in &self.counts {
            writeln!(
                f,
                "{:<10} {:<9} {:>8} {:>8} {:>8} {:>9}",
                partition.as_str(),
                category.to_string(),
                c.written,
                c.skipped,
                c.defects,
                c.cancelled
            )?;
        }
        let t = self.totals();
        writeln!(
            f,
            "{:<10} {:<9} {:>8} {:>8} {:>8} {:>9}",
            "total", "", t.written, t.skipped, t.defects, t.cancelled
        )?;
        write!(
            f,
            "seed {}, {} classes, {} unreadable sources, manifest: {}",
            self.seed,
            self.classes.len(),
            self.failed_sources,
            self.manifest
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "not written".to_string())
        )
    }
}

/// План одной выборки
struct PartitionPlan {
    partition: Partition,
    distractors: ImageSet,
    tasks: Vec<SampleTask>,
}

/// Генератор датасета
pub struct DatasetGenerator {
    config: GenerationConfig,
    cancel: CancelToken,
}

impl DatasetGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Полный прогон.
    ///
    /// Все фатальные проверки (конфигурация, пулы, карта классов, пул
    /// потоков) выполняются до того, как на диске что-либо изменится.
    pub fn run(&self) -> Result<RunSummary, SynthError> {
        let config = &self.config;
        config.validate()?;

        let layout = DatasetLayout::new(&config.output_dir);
        let backgrounds = list_images(&config.background_dir)?;
        if backgrounds.is_empty() {
            return Err(SynthError::Configuration(format!(
                "no background images in {}",
                config.background_dir.display()
            )));
        }
        log::info!(
            "Loaded {} backgrounds from {}",
            backgrounds.len(),
            config.background_dir.display()
        );

        let mut rng = StdRng::seed_from_u64(config.seed);
        let (classes, split, partitions) = match config.partitions {
            PartitionSelection::Both => {
                let classes = ClassMap::build(&config.foreground_root_train)?;
                let split = PartitionSplit::shuffle_split(backgrounds, config.train_ratio, &mut rng);
                (classes, split, vec![Partition::Train, Partition::Test])
            }
            PartitionSelection::TestOnly => {
                let (classes, split) = self.load_previous_run(&layout, &backgrounds)?;
                (classes, split, vec![Partition::Test])
            }
        };
        log::info!(
            "Class map: {}",
            classes
                .iter()
                .map(|(id, name)| format!("{id}={name}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        log::info!(
            "Background split: {} train, {} test",
            split.train.len(),
            split.test.len()
        );

        let mut names = NameAllocator::new();
        let mut plans = Vec::with_capacity(partitions.len());
        for partition in partitions {
            plans.push(self.plan_partition(
                partition,
                &classes,
                split.get(partition),
                &mut names,
                &mut rng,
            )?);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads.unwrap_or(0))
            .build()
            .map_err(|e| SynthError::Configuration(format!("thread pool: {e}")))?;

        self.prepare_output(&layout, &classes, &split)?;

        let engine = SampleEngine::new(config, layout.clone());
        let mut summary = RunSummary::new(config.seed, classes.clone());
        for plan in &plans {
            log::info!(
                "Generating {} {} samples ({} distractors) on {} threads",
                plan.tasks.len(),
                plan.partition,
                plan.distractors.len(),
                pool.current_num_threads()
            );
            engine.reserve(&plan.tasks);
            let outcomes: Vec<(Category, Outcome)> = pool.install(|| {
                plan.tasks
                    .par_iter()
                    .map(|task| (task.category(), self.execute(&engine, task, &plan.distractors)))
                    .collect()
            });
            // Дистракторы и окна, не дошедшие до последней задачи (отмена)
            log::debug!(
                "{}: releasing {} cached sources",
                plan.partition,
                engine.cache().cached_count()
            );
            engine.cache().clear();
            for (category, outcome) in outcomes {
                summary
                    .counts
                    .entry((plan.partition, category))
                    .or_default()
                    .record(outcome);
            }
            for category in [Category::Positive, Category::Negative] {
                let c = summary.get(plan.partition, category);
                log::info!(
                    "{} {}: {} written, {} skipped, {} defects",
                    plan.partition,
                    category,
                    c.written,
                    c.skipped,
                    c.defects
                );
            }
        }
        summary.failed_sources = engine.cache().failed_count();

        if summary.totals().cancelled > 0 {
            log::warn!(
                "Run cancelled, {} tasks not executed; manifest not written",
                summary.totals().cancelled
            );
            return Ok(summary);
        }

        summary.manifest = Some(self.write_manifest(&layout, &classes)?);
        Ok(summary)
    }

    /// Карта классов и разбиение предыдущего полного прогона
    fn load_previous_run(
        &self,
        layout: &DatasetLayout,
        backgrounds: &[PathBuf],
    ) -> Result<(ClassMap, PartitionSplit), SynthError> {
        let class_map_path = self.config.class_map_path();
        let split_path = layout.split_path();
        for required in [&class_map_path, &split_path] {
            if !required.is_file() {
                return Err(SynthError::Configuration(format!(
                    "test-only run needs {} from a previous full run",
                    required.display()
                )));
            }
        }

        let classes = ClassMap::load_or_build(&self.config.foreground_root_train, &class_map_path)?;
        let manifest_path = self.config.manifest_path();
        if manifest_path.is_file()
            && !DatasetManifest::load(&manifest_path)?.matches_classes(&classes)
        {
            return Err(SynthError::Configuration(format!(
                "{} lists different classes than {}",
                manifest_path.display(),
                class_map_path.display()
            )));
        }
        let mut split = PartitionSplit::load(&split_path)?;

        // Обучающие фоны в тестовую выборку не переносятся
        let available: HashSet<&PathBuf> = backgrounds.iter().collect();
        let before = split.test.len();
        split.test.retain(|p| available.contains(p));
        if split.test.len() < before {
            log::warn!(
                "{} test backgrounds from {} are gone",
                before - split.test.len(),
                split_path.display()
            );
        }
        Ok((classes, split))
    }

    fn plan_partition(
        &self,
        partition: Partition,
        classes: &ClassMap,
        backgrounds: &[PathBuf],
        names: &mut NameAllocator,
        rng: &mut StdRng,
    ) -> Result<PartitionPlan, SynthError> {
        let config = &self.config;
        let (root, replicas, negatives) = match partition {
            Partition::Train => (
                config.foreground_root_train.as_path(),
                config.train_replicas,
                config.negatives.train_count,
            ),
            Partition::Test => (
                config.foreground_root_for_test(),
                config.test_replicas,
                config.negatives.test_count,
            ),
        };
        let distractors = ImageSet::from_dir(&root.join(DISTRACTOR_DIR))?;
        if distractors.is_empty() {
            log::info!("{partition}: no distractors, occlusion and noise disabled");
        }

        let pick_background = |rng: &mut StdRng| {
            backgrounds.choose(rng).cloned().ok_or_else(|| {
                SynthError::Configuration(format!(
                    "{partition} partition has no backgrounds (train_ratio {})",
                    config.train_ratio
                ))
            })
        };

        let mut tasks = Vec::new();
        for (class_id, class_name) in classes.iter() {
            let foregrounds = list_images(&root.join(class_name))?;
            if foregrounds.is_empty() {
                log::warn!(
                    "{partition}: class '{class_name}' has no foregrounds under {}",
                    root.display()
                );
            }
            for foreground in foregrounds {
                for replica in 0..replicas.sample(rng) {
                    tasks.push(SampleTask {
                        partition,
                        name: names.positive(partition, class_name),
                        background: pick_background(rng)?,
                        kind: SampleKind::Positive {
                            class_id,
                            class_name: class_name.to_string(),
                            foreground: foreground.clone(),
                            replica,
                        },
                        seed: next_task_seed(rng),
                    });
                }
            }
        }

        for _ in 0..negatives {
            tasks.push(SampleTask {
                partition,
                name: names.negative(partition),
                background: pick_background(rng)?,
                kind: SampleKind::Negative,
                seed: next_task_seed(rng),
            });
        }

        Ok(PartitionPlan {
            partition,
            distractors,
            tasks,
        })
    }

    /// Очистка каталогов вывода и сохранение состояния прогона
    fn prepare_output(
        &self,
        layout: &DatasetLayout,
        classes: &ClassMap,
        split: &PartitionSplit,
    ) -> Result<(), SynthError> {
        let manifest_path = self.config.manifest_path();
        match self.config.partitions {
            PartitionSelection::Both => {
                layout.reset_all()?;
                split.save(&layout.split_path())?;
            }
            PartitionSelection::TestOnly => layout.reset_partition(Partition::Test)?,
        }
        // Манифест - сигнал завершения, старый не должен пережить новый прогон
        if manifest_path.exists() {
            fs::remove_file(&manifest_path).map_err(|source| SynthError::Io {
                path: manifest_path.clone(),
                source,
            })?;
        }
        classes.save(&self.config.class_map_path())
    }

    fn execute(&self, engine: &SampleEngine, task: &SampleTask, distractors: &ImageSet) -> Outcome {
        if self.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        match engine.run(task, distractors) {
            Ok(_) => Outcome::Written,
            Err(failure) => {
                let context = describe(task);
                match &failure.error {
                    SynthError::Annotation(_) => {
                        log::error!("Label defect in {context}: {failure}");
                        Outcome::Defect
                    }
                    e if e.is_recoverable() => {
                        log::warn!("Skipped {context}: {failure}");
                        Outcome::Skipped
                    }
                    _ => {
                        log::error!("Skipped {context}: {failure}");
                        Outcome::Skipped
                    }
                }
            }
        }
    }

    fn write_manifest(&self, layout: &DatasetLayout, classes: &ClassMap) -> Result<PathBuf, SynthError> {
        let root = fs::canonicalize(layout.root()).map_err(|source| SynthError::Io {
            path: layout.root().to_path_buf(),
            source,
        })?;
        let absolute = DatasetLayout::new(&root);
        let train_dir = absolute.images_dir(Partition::Train);
        let test_dir = absolute.images_dir(Partition::Test);

        let manifest = DatasetManifest::new(&root, &train_dir, &test_dir, classes)
            .with_image_counts(list_images(&train_dir)?.len(), list_images(&test_dir)?.len());
        let path = self.config.manifest_path();
        manifest.write(&path)?;
        log::info!(
            "Manifest written to {} ({} train, {} test images)",
            path.display(),
            manifest.train_images,
            manifest.test_images
        );
        Ok(path)
    }
}

fn describe(task: &SampleTask) -> String {
    let source = match &task.kind {
        SampleKind::Positive { foreground, .. } => format!(", foreground {}", display(foreground)),
        SampleKind::Negative => String::new(),
    };
    format!(
        "{} {} (seed {}, background {}{})",
        task.partition,
        task.name,
        task.seed,
        display(&task.background),
        source
    )
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let generator = DatasetGenerator::new(GenerationConfig::default()).with_cancel_token(token.clone());
        assert!(!generator.cancel_token().is_cancelled());
        token.cancel();
        assert!(generator.cancel_token().is_cancelled());
    }

    #[test]
    fn test_counts_and_totals() {
        let mut summary = RunSummary::new(7, ClassMap::from_names(["a"]));
        for outcome in [Outcome::Written, Outcome::Written, Outcome::Skipped] {
            summary
                .counts
                .entry((Partition::Train, Category::Positive))
                .or_default()
                .record(outcome);
        }
        summary
            .counts
            .entry((Partition::Test, Category::Negative))
            .or_default()
            .record(Outcome::Defect);

        let totals = summary.totals();
        assert_eq!((totals.written, totals.skipped, totals.defects), (2, 1, 1));
        assert_eq!(totals.total(), 4);
        assert!(!summary.is_complete());
        assert!(summary.to_string().contains("not written"));
    }

    #[test]
    fn test_missing_backgrounds_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = GenerationConfig {
            background_dir: dir.path().join("none"),
            output_dir: dir.path().join("out"),
            ..GenerationConfig::default()
        };
        let result = DatasetGenerator::new(config).run();
        assert!(matches!(result, Err(SynthError::Configuration(_))));
        assert!(!dir.path().join("out").exists());
    }
}
