// src/render/mod.rs

//! Rendering: normalize heterogeneous catalog references into the index.
//!
//! A reference is a local declarative-config directory, a local indexed
//! database file, or a container image whose labels identify it as a
//! config tree, a database image, or a single bundle. Everything funnels
//! into the package index; the combined declarative config comes back out
//! in canonical per-package order.

pub mod bundle;

use std::path::Path;

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::declcfg::index::PackageIndex;
use crate::declcfg::{combine_configs, DeclarativeConfig};
use crate::error::{Error, Result};
use crate::sqlite::Query;
use crate::image::{ImageRegistry, CONFIGS_LABEL, DB_LABEL, PACKAGE_LABEL};
use crate::property::{self, TYPE_BUNDLE_OBJECT};
use crate::sqlite;

/// A render operation over a list of references.
pub struct Render<'a> {
    pub refs: Vec<String>,
    /// Registry collaborator for image references. Directory and database
    /// references work without one.
    pub registry: Option<&'a dyn ImageRegistry>,
    pub cancel: CancelToken,
}

impl<'a> Render<'a> {
    pub fn new(refs: Vec<String>) -> Self {
        Render {
            refs,
            registry: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_registry(mut self, registry: &'a dyn ImageRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Render every reference and return the combined declarative config.
    pub fn run(&self) -> Result<DeclarativeConfig> {
        let mut idx = PackageIndex::new();
        let result = self.index_into(&mut idx).and_then(|()| {
            let mut cfgs = Vec::new();
            for pkg_name in idx.package_names() {
                cfgs.push(idx.load_package_config(&pkg_name)?);
            }
            Ok(combine_configs(cfgs))
        });
        if let Err(e) = idx.cleanup() {
            warn!(error = %e, "failed to clean up render index");
        }
        result
    }

    /// Render every reference into a caller-owned index.
    pub fn index_into(&self, idx: &mut PackageIndex) -> Result<()> {
        for reference in &self.refs {
            self.cancel.check()?;
            self.index_ref(idx, reference).map_err(|e| match e {
                Error::Reference { .. } | Error::Canceled => e,
                other => Error::reference(reference, other.to_string()),
            })?;
        }
        Ok(())
    }

    fn index_ref(&self, idx: &mut PackageIndex, reference: &str) -> Result<()> {
        let path = Path::new(reference);
        if path.is_dir() {
            debug!(reference, "indexing declarative config directory");
            return idx.index_dir(path);
        }
        if path.is_file() {
            debug!(reference, "indexing database file");
            return index_database(path, idx);
        }
        self.index_image(idx, reference)
    }

    fn index_image(&self, idx: &mut PackageIndex, reference: &str) -> Result<()> {
        let registry = self
            .registry
            .ok_or_else(|| Error::reference(reference, "no image registry configured"))?;
        registry.pull(&self.cancel, reference)?;
        let labels = registry.labels(&self.cancel, reference)?;
        let unpack_dir = tempfile::Builder::new().prefix("opcat-unpack.").tempdir()?;
        registry.unpack(&self.cancel, reference, unpack_dir.path())?;

        if let Some(db_path) = labels.get(DB_LABEL) {
            debug!(reference, "image carries an indexed database");
            index_database(
                &unpack_dir.path().join(db_path.trim_start_matches('/')),
                idx,
            )
        } else if let Some(cfg_dir) = labels.get(CONFIGS_LABEL) {
            debug!(reference, "image carries a declarative config tree");
            idx.index_dir(&unpack_dir.path().join(cfg_dir.trim_start_matches('/')))
        } else if labels.contains_key(PACKAGE_LABEL) {
            debug!(reference, "image is a single bundle");
            let mut cfg = bundle::bundle_to_config(reference, unpack_dir.path())?;
            render_bundle_objects(&mut cfg);
            idx.add(&cfg)
        } else if labels.is_empty() {
            Err(Error::reference(
                reference,
                "image type could not be determined: image has no labels",
            ))
        } else {
            let listing: Vec<String> = labels
                .iter()
                .map(|(k, v)| format!("  {k}={v}"))
                .collect();
            Err(Error::reference(
                reference,
                format!(
                    "image type could not be determined, found labels\n{}",
                    listing.join("\n")
                ),
            ))
        }
    }
}

/// Emit every package of a legacy indexed database into the index.
fn index_database(path: &Path, idx: &mut PackageIndex) -> Result<()> {
    let querier = sqlite::SqliteQuerier::open(path)?;
    for pkg_name in querier.list_packages()? {
        let mut cfg = sqlite::package_to_config(&querier, &pkg_name)?;
        render_bundle_objects(&mut cfg);
        idx.add(&cfg)?;
    }
    Ok(())
}

/// Replace any pre-existing bundle-object properties with ones built from
/// the bundles' inline objects.
pub fn render_bundle_objects(cfg: &mut DeclarativeConfig) {
    for b in &mut cfg.bundles {
        b.properties.retain(|p| p.typ != TYPE_BUNDLE_OBJECT);
        for obj in &b.objects {
            b.properties.push(property::bundle_object_data(obj.as_bytes()));
        }
    }
}
