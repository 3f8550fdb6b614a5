//! Full generation runs against synthetic fixtures

mod common;

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use common::{init_logging, snapshot, Fixture};
use synth_core::dataset::SPLIT_FILE;
use synth_core::{
    verify_dataset, CancelToken, Category, ClassMap, DatasetGenerator, DatasetLayout,
    DatasetManifest, NegativeMode, Partition, PartitionSelection, PartitionSplit, ReplicaCount,
    SynthError,
};

#[test]
fn test_full_run_produces_verified_dataset() {
    init_logging();
    let fixture = Fixture::new();
    let config = fixture.config("out");
    let out = config.output_dir.clone();

    let summary = DatasetGenerator::new(config).run().unwrap();
    println!("{summary}");

    // 3 classes x 2 windows x replicas
    assert_eq!(summary.get(Partition::Train, Category::Positive).written, 12);
    assert_eq!(summary.get(Partition::Test, Category::Positive).written, 6);
    assert_eq!(summary.get(Partition::Train, Category::Negative).written, 4);
    assert_eq!(summary.get(Partition::Test, Category::Negative).written, 2);
    let totals = summary.totals();
    assert_eq!((totals.skipped, totals.defects, totals.cancelled), (0, 0, 0));
    assert!(summary.is_complete());

    let manifest = DatasetManifest::load(&out.join("data.yaml")).unwrap();
    assert_eq!(manifest.names, ["ChatGPT", "Claude", "Gemini"]);
    assert_eq!(manifest.nc, 3);
    assert_eq!((manifest.train_images, manifest.test_images), (16, 8));
    assert!(manifest.train.is_absolute());

    let report = verify_dataset(&out).unwrap();
    assert!(report.is_clean(), "{report}");
    assert_eq!((report.positives, report.negatives), (18, 6));

    let layout = DatasetLayout::new(&out);
    for partition in Partition::ALL {
        for entry in fs::read_dir(layout.labels_dir(partition)).unwrap() {
            let path = entry.unwrap().path();
            let name = path.file_stem().unwrap().to_string_lossy().into_owned();
            let len = fs::metadata(&path).unwrap().len();
            if name.contains("_neg_") {
                assert_eq!(len, 0, "{name}");
            } else {
                assert!(len > 0, "{name}");
            }
        }
    }
}

#[test]
fn test_partitions_never_share_backgrounds() {
    let fixture = Fixture::new();
    let config = fixture.config("out");
    let out = config.output_dir.clone();
    DatasetGenerator::new(config).run().unwrap();

    let split = PartitionSplit::load(&out.join(SPLIT_FILE)).unwrap();
    assert_eq!((split.train.len(), split.test.len()), (9, 1));
    let train: HashSet<&PathBuf> = split.train.iter().collect();
    assert!(split.test.iter().all(|p| !train.contains(p)));
}

#[test]
fn test_same_seed_same_bytes_regardless_of_threads() {
    let fixture = Fixture::new();
    let mut single = fixture.config("single");
    single.threads = Some(1);
    let mut many = fixture.config("many");
    many.threads = Some(4);

    DatasetGenerator::new(single.clone()).run().unwrap();
    DatasetGenerator::new(many.clone()).run().unwrap();

    let a = DatasetLayout::new(&single.output_dir);
    let b = DatasetLayout::new(&many.output_dir);
    for partition in Partition::ALL {
        assert_eq!(snapshot(&a.labels_dir(partition)), snapshot(&b.labels_dir(partition)));
        assert_eq!(snapshot(&a.images_dir(partition)), snapshot(&b.images_dir(partition)));
    }
}

#[test]
fn test_different_seed_changes_output() {
    let fixture = Fixture::new();
    let first = fixture.config("first");
    let mut second = fixture.config("second");
    second.seed = 8;

    DatasetGenerator::new(first.clone()).run().unwrap();
    DatasetGenerator::new(second.clone()).run().unwrap();

    let a = DatasetLayout::new(&first.output_dir);
    let b = DatasetLayout::new(&second.output_dir);
    assert_ne!(
        snapshot(&a.labels_dir(Partition::Train)),
        snapshot(&b.labels_dir(Partition::Train))
    );
}

#[test]
fn test_plain_negatives_have_empty_labels() {
    init_logging();
    let fixture = Fixture::new();
    let mut config = fixture.config("negatives");
    config.train_replicas = ReplicaCount::fixed(0);
    config.test_replicas = ReplicaCount::fixed(0);
    config.train_ratio = 1.0;
    config.negatives.mode = NegativeMode::Plain;
    config.negatives.train_count = 50;
    config.negatives.test_count = 0;
    let out = config.output_dir.clone();

    let summary = DatasetGenerator::new(config).run().unwrap();
    assert_eq!(summary.get(Partition::Train, Category::Negative).written, 50);
    assert_eq!(summary.get(Partition::Train, Category::Positive).total(), 0);

    let layout = DatasetLayout::new(&out);
    let images = snapshot(&layout.images_dir(Partition::Train));
    let labels = snapshot(&layout.labels_dir(Partition::Train));
    assert_eq!(images.len(), 50);
    assert_eq!(labels.len(), 50);
    assert!(labels.iter().all(|(_, bytes)| bytes.is_empty()));
}

#[test]
fn test_corrupt_foreground_is_skipped_not_fatal() {
    init_logging();
    let fixture = Fixture::new();
    fs::write(fixture.foregrounds().join("Claude").join("broken.png"), b"not an image").unwrap();
    let config = fixture.config("out");

    let summary = DatasetGenerator::new(config).run().unwrap();

    let train = summary.get(Partition::Train, Category::Positive);
    let test = summary.get(Partition::Test, Category::Positive);
    assert_eq!((train.written, train.skipped), (12, 2));
    assert_eq!((test.written, test.skipped), (6, 1));
    assert_eq!(summary.failed_sources, 1);
    assert!(summary.is_complete());
}

#[test]
fn test_test_only_regeneration_keeps_train() {
    let fixture = Fixture::new();
    let config = fixture.config("out");
    let out = config.output_dir.clone();
    DatasetGenerator::new(config.clone()).run().unwrap();

    let layout = DatasetLayout::new(&out);
    let train_before = snapshot(&layout.images_dir(Partition::Train));
    let split = PartitionSplit::load(&out.join(SPLIT_FILE)).unwrap();

    let mut rerun = config;
    rerun.partitions = PartitionSelection::TestOnly;
    rerun.seed = 99;
    rerun.test_replicas = ReplicaCount::fixed(2);
    let summary = DatasetGenerator::new(rerun).run().unwrap();

    assert_eq!(summary.get(Partition::Train, Category::Positive).total(), 0);
    assert_eq!(summary.get(Partition::Test, Category::Positive).written, 12);
    assert_eq!(snapshot(&layout.images_dir(Partition::Train)), train_before);
    assert_eq!(PartitionSplit::load(&out.join(SPLIT_FILE)).unwrap(), split);

    let manifest = DatasetManifest::load(&out.join("data.yaml")).unwrap();
    assert_eq!((manifest.train_images, manifest.test_images), (16, 14));
    assert!(verify_dataset(&out).unwrap().is_clean());
}

#[test]
fn test_test_only_needs_previous_run() {
    let fixture = Fixture::new();
    let mut config = fixture.config("fresh");
    config.partitions = PartitionSelection::TestOnly;

    let result = DatasetGenerator::new(config).run();
    assert!(matches!(result, Err(SynthError::Configuration(_))));
}

#[test]
fn test_changed_class_folders_block_test_only_run() {
    let fixture = Fixture::new();
    let config = fixture.config("out");
    DatasetGenerator::new(config.clone()).run().unwrap();

    let extra = fixture.foregrounds().join("Copilot");
    fs::create_dir_all(&extra).unwrap();
    common::window(40, 30, [1, 2, 3]).save(extra.join("a.png")).unwrap();

    let mut rerun = config;
    rerun.partitions = PartitionSelection::TestOnly;
    let result = DatasetGenerator::new(rerun.clone()).run();
    assert!(matches!(result, Err(SynthError::Configuration(_))));

    // persisted map untouched
    let persisted = ClassMap::load(&rerun.class_map_path()).unwrap();
    assert_eq!(persisted.names(), ["ChatGPT", "Claude", "Gemini"]);
}

#[test]
fn test_manifest_with_other_classes_blocks_test_only_run() {
    let fixture = Fixture::new();
    let config = fixture.config("out");
    DatasetGenerator::new(config.clone()).run().unwrap();

    let manifest_path = config.manifest_path();
    let mut manifest = DatasetManifest::load(&manifest_path).unwrap();
    manifest.names.reverse();
    manifest.write(&manifest_path).unwrap();

    let mut rerun = config;
    rerun.partitions = PartitionSelection::TestOnly;
    let result = DatasetGenerator::new(rerun).run();
    assert!(matches!(result, Err(SynthError::Configuration(_))));
}

#[test]
fn test_cancelled_run_writes_no_manifest() {
    let fixture = Fixture::new();
    let config = fixture.config("out");
    let manifest_path = config.manifest_path();

    let token = CancelToken::new();
    token.cancel();
    let summary = DatasetGenerator::new(config)
        .with_cancel_token(token)
        .run()
        .unwrap();

    assert_eq!(summary.totals().written, 0);
    assert_eq!(summary.totals().cancelled, 24);
    assert!(!summary.is_complete());
    assert!(!manifest_path.exists());
}

#[test]
fn test_missing_foreground_root_is_fatal_before_writing() {
    let fixture = Fixture::new();
    let mut config = fixture.config("out");
    config.foreground_root_train = fixture.root().join("nowhere");
    let out = config.output_dir.clone();

    let result = DatasetGenerator::new(config).run();
    assert!(matches!(result, Err(SynthError::Configuration(_))));
    assert!(!out.exists());
}
