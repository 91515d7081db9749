// src/image/mod.rs

//! Image-registry collaborator interface.
//!
//! The engine never talks to container registries itself; it consumes this
//! trait. A real implementation pulls and unpacks images; the mock serves
//! pre-arranged label maps and directory trees and backs the test suites.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};

/// Label marking a declarative-config index image; the value is the config
/// tree path inside the image.
pub const CONFIGS_LABEL: &str = "operators.operatorframework.io.index.configs.v1";
/// Legacy label marking an indexed-database image; the value is the db
/// file path inside the image.
pub const DB_LABEL: &str = "operators.operatorframework.io.index.database.v1";
/// Label marking a single-bundle image; the value is the package name.
pub const PACKAGE_LABEL: &str = "operators.operatorframework.io.bundle.package.v1";

/// Operations the engine needs from a container-image registry.
pub trait ImageRegistry {
    /// Fetch the image into local storage.
    fn pull(&self, cancel: &CancelToken, reference: &str) -> Result<()>;

    /// The image's config labels.
    fn labels(&self, cancel: &CancelToken, reference: &str) -> Result<BTreeMap<String, String>>;

    /// Extract the image filesystem under `dir`.
    fn unpack(&self, cancel: &CancelToken, reference: &str, dir: &Path) -> Result<()>;

    /// Release local storage held by the registry.
    fn destroy(&self) -> Result<()>;
}

/// An in-memory registry fixture: each known reference maps to a label set
/// and a directory tree to unpack.
#[derive(Debug, Default)]
pub struct MockRegistry {
    pub images: BTreeMap<String, MockImage>,
}

#[derive(Debug, Clone)]
pub struct MockImage {
    pub labels: BTreeMap<String, String>,
    /// Directory copied verbatim on unpack.
    pub root: PathBuf,
}

impl MockRegistry {
    pub fn new() -> Self {
        MockRegistry::default()
    }

    pub fn with_image(mut self, reference: &str, labels: &[(&str, &str)], root: &Path) -> Self {
        self.images.insert(
            reference.to_string(),
            MockImage {
                labels: labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                root: root.to_path_buf(),
            },
        );
        self
    }

    fn image(&self, reference: &str) -> Result<&MockImage> {
        self.images
            .get(reference)
            .ok_or_else(|| Error::reference(reference, "image not found in mock registry"))
    }
}

impl ImageRegistry for MockRegistry {
    fn pull(&self, cancel: &CancelToken, reference: &str) -> Result<()> {
        cancel.check()?;
        self.image(reference).map(|_| ())
    }

    fn labels(&self, cancel: &CancelToken, reference: &str) -> Result<BTreeMap<String, String>> {
        cancel.check()?;
        Ok(self.image(reference)?.labels.clone())
    }

    fn unpack(&self, cancel: &CancelToken, reference: &str, dir: &Path) -> Result<()> {
        cancel.check()?;
        let image = self.image(reference)?;
        copy_tree(&image.root, dir)
    }

    fn destroy(&self) -> Result<()> {
        Ok(())
    }
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
