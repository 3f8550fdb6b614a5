//! Dataset manifest consumed by the detection trainer (`data.yaml`).
//!
//! Written last; its presence means both partitions are complete.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::registry::ClassMap;
use crate::SynthError;

pub const MANIFEST_FILE: &str = "data.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
    /// Absolute dataset root.
    pub path: PathBuf,
    /// Absolute train image directory.
    pub train: PathBuf,
    /// Validation images; this dataset validates on the test split.
    pub val: PathBuf,
    /// Absolute test image directory.
    pub test: PathBuf,
    /// Class count.
    pub nc: usize,
    /// Class names, index = class ID.
    pub names: Vec<String>,
    #[serde(default)]
    pub train_images: usize,
    #[serde(default)]
    pub test_images: usize,
}

impl DatasetManifest {
    pub fn new(root: &Path, train_dir: &Path, test_dir: &Path, classes: &ClassMap) -> Self {
        Self {
            path: root.to_path_buf(),
            train: train_dir.to_path_buf(),
            val: test_dir.to_path_buf(),
            test: test_dir.to_path_buf(),
            nc: classes.len(),
            names: classes.names().to_vec(),
            train_images: 0,
            test_images: 0,
        }
    }

    pub fn with_image_counts(mut self, train: usize, test: usize) -> Self {
        self.train_images = train;
        self.test_images = test;
        self
    }

    pub fn to_yaml(&self) -> Result<String, SynthError> {
        Ok(serde_yml::to_string(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, SynthError> {
        let raw = fs::read_to_string(path).map_err(|source| SynthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yml::from_str(&raw)?)
    }

    /// Write through a temporary file and rename, so a reader never sees a
    /// half-written manifest.
    pub fn write(&self, path: &Path) -> Result<(), SynthError> {
        let yaml = self.to_yaml()?;
        let tmp = path.with_extension("yaml.tmp");
        fs::write(&tmp, yaml).map_err(|source| SynthError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| SynthError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check that the manifest still describes `classes`.
    pub fn matches_classes(&self, classes: &ClassMap) -> bool {
        self.nc == classes.len() && self.names == classes.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_yaml_fields() {
        let classes = ClassMap::from_names(["Gemini", "ChatGPT", "Claude"]);
        let manifest = DatasetManifest::new(
            Path::new("/data/out"),
            Path::new("/data/out/images/train"),
            Path::new("/data/out/images/test"),
            &classes,
        )
        .with_image_counts(90, 10);

        let yaml = manifest.to_yaml().unwrap();
        assert!(yaml.contains("nc: 3"));
        assert!(yaml.contains("test_images: 10"));
        assert!(yaml.contains("train: /data/out/images/train"));
        assert!(yaml.contains("- ChatGPT"));

        let back: DatasetManifest = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(back.names, ["ChatGPT", "Claude", "Gemini"]);
        assert!(back.matches_classes(&classes));
    }

    #[test]
    fn test_write_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        let classes = ClassMap::from_names(["a"]);
        let manifest = DatasetManifest::new(dir.path(), dir.path(), dir.path(), &classes);
        let path = dir.path().join(MANIFEST_FILE);

        manifest.write(&path).unwrap();
        assert_eq!(DatasetManifest::load(&path).unwrap(), manifest);
        assert!(!dir.path().join("data.yaml.tmp").exists());
    }
}
