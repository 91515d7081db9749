// src/declcfg/index.rs

//! Disk-spilled per-package cache of declarative records.
//!
//! Catalogs can be far larger than memory. The index appends every record
//! to a per-package file under a scratch directory as it streams in, and
//! later re-loads one package at a time. The cache is create-once,
//! append-many, read-many; an explicit cleanup tears it down and renders
//! the index unusable.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::declcfg::{load, DeclarativeConfig, Meta, SCHEMA_BUNDLE, SCHEMA_PACKAGE};
use crate::error::{Error, Result};
use crate::model;

const GLOBAL_NAME: &str = "global";
const OBJECT_SUFFIX: &str = ".object";

/// Bucket name for schema-unknown documents of a package (or of no
/// package at all).
fn object_bucket(package: &str) -> String {
    if package.is_empty() {
        format!("{GLOBAL_NAME}{OBJECT_SUFFIX}")
    } else {
        format!("{package}{OBJECT_SUFFIX}")
    }
}

/// A spillable package index over a temporary cache directory.
pub struct PackageIndex {
    cache: Option<tempfile::TempDir>,
    encoders: BTreeMap<String, File>,
    cleaned_up: bool,
}

impl PackageIndex {
    pub fn new() -> Self {
        PackageIndex {
            cache: None,
            encoders: BTreeMap::new(),
            cleaned_up: false,
        }
    }

    /// Index every declarative document under `dir`. May be called
    /// multiple times with different directories.
    pub fn index_dir(&mut self, dir: &Path) -> Result<()> {
        self.ensure_usable()?;
        let mut docs: Vec<serde_json::Value> = Vec::new();
        load::walk_files(dir, |path, text| {
            match load::documents_in(text) {
                Ok(found) => docs.extend(found),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping undecodable file");
                }
            }
            Ok(())
        })?;
        for doc in docs {
            let schema = doc
                .get("schema")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            let bucket = match schema {
                SCHEMA_PACKAGE => {
                    let p: super::Package = serde_json::from_value(doc.clone())?;
                    p.name
                }
                SCHEMA_BUNDLE => {
                    let b: super::Bundle = serde_json::from_value(doc.clone())?;
                    b.package
                }
                "" => continue,
                _ => object_bucket(&Meta::from_value(doc.clone()).package),
            };
            self.append(&bucket, &doc)?;
        }
        Ok(())
    }

    /// Append every record of `cfg` under its package bucket.
    pub fn add(&mut self, cfg: &DeclarativeConfig) -> Result<()> {
        self.ensure_usable()?;
        for p in &cfg.packages {
            self.append(&p.name, p)?;
        }
        for b in &cfg.bundles {
            self.append(&b.package, b)?;
        }
        for o in &cfg.others {
            self.append(&object_bucket(&o.package), o)?;
        }
        Ok(())
    }

    /// All indexed package names, excluding object buckets, in sorted
    /// order.
    pub fn package_names(&self) -> Vec<String> {
        self.encoders
            .keys()
            .filter(|name| !name.ends_with(OBJECT_SUFFIX))
            .cloned()
            .collect()
    }

    /// Re-read one package's records as a declarative config. Records for
    /// any other package mean the cache was modified out from under us.
    pub fn load_package_config(&self, pkg_name: &str) -> Result<DeclarativeConfig> {
        self.ensure_usable()?;
        let cache = match &self.cache {
            Some(cache) => cache,
            None => {
                return Err(Error::IndexTampered(format!(
                    "no package config for package {pkg_name:?} found"
                )))
            }
        };
        let cfg = load::load_fs(&cache.path().join(pkg_name))?;
        match cfg.packages.len() {
            0 => {
                if cfg.bundles.is_empty() {
                    return Err(Error::IndexTampered(format!(
                        "no package config for package {pkg_name:?} found"
                    )));
                }
                for b in &cfg.bundles {
                    if b.package != pkg_name {
                        return Err(Error::IndexTampered(format!(
                            "package {:?} found instead of {pkg_name:?}",
                            b.package
                        )));
                    }
                }
            }
            1 => {
                if cfg.packages[0].name != pkg_name {
                    return Err(Error::IndexTampered(format!(
                        "package {:?} found instead of {pkg_name:?}",
                        cfg.packages[0].name
                    )));
                }
            }
            _ => {
                let names: Vec<&str> =
                    cfg.packages.iter().map(|p| p.name.as_str()).collect();
                return Err(Error::IndexTampered(format!(
                    "multiple package configs for package {pkg_name:?} found ({})",
                    names.join(",")
                )));
            }
        }
        Ok(cfg)
    }

    /// Load one package as a validated model package.
    pub fn load_package_model(&self, pkg_name: &str) -> Result<model::Package> {
        let cfg = self.load_package_config(pkg_name)?;
        let mut m = super::convert::convert_to_model(&cfg)?;
        m.packages.remove(pkg_name).ok_or_else(|| {
            Error::IndexTampered(format!("no package config for package {pkg_name:?} found"))
        })
    }

    /// Close every encoder and remove the cache directory. Idempotent;
    /// the index is unusable afterwards.
    pub fn cleanup(&mut self) -> Result<()> {
        self.encoders.clear();
        if let Some(cache) = self.cache.take() {
            cache.close()?;
        }
        self.cleaned_up = true;
        Ok(())
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.cleaned_up {
            return Err(Error::validation(
                "package index",
                "index is already cleaned up",
            ));
        }
        Ok(())
    }

    fn cache_dir(&mut self) -> Result<PathBuf> {
        if self.cache.is_none() {
            let dir = tempfile::Builder::new().prefix("opcat-index.").tempdir()?;
            debug!(dir = %dir.path().display(), "created index cache");
            self.cache = Some(dir);
        }
        match &self.cache {
            Some(cache) => Ok(cache.path().to_path_buf()),
            None => Err(Error::validation("package index", "cache unavailable")),
        }
    }

    fn append<T: Serialize>(&mut self, bucket: &str, record: &T) -> Result<()> {
        let cache_dir = self.cache_dir()?;
        if !self.encoders.contains_key(bucket) {
            let dir = cache_dir.join(bucket);
            std::fs::create_dir_all(&dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join("index.json"))?;
            self.encoders.insert(bucket.to_string(), file);
        }
        let file = match self.encoders.get_mut(bucket) {
            Some(file) => file,
            None => return Err(Error::validation("package index", "missing encoder")),
        };
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        file.write_all(&line)?;
        Ok(())
    }
}

impl Default for PackageIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PackageIndex {
    fn drop(&mut self) {
        if !self.cleaned_up {
            if let Err(e) = self.cleanup() {
                warn!(error = %e, "failed to clean up package index");
            }
        }
    }
}
