// src/declcfg/diff.rs

//! Diff orchestration over an indexed catalog.
//!
//! A diff config records what a consumer already holds: packages, channels
//! with their installed head, and bundle names. Against a freshly indexed
//! "new" catalog, the diff selects the content the consumer is missing —
//! either by walking the upgrade graph from each recorded head (fill mode)
//! or by exact set intersection — then closes dependencies and scrubs
//! dangling replaces. Every mode is selection -> resolver -> scrub; only
//! the selection differs.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::declcfg::index::PackageIndex;
use crate::declcfg::{convert, deps, DeclarativeConfig};
use crate::error::{Error, KeyKind, Result};
use crate::model::{self, Model};

/// Serialized description of an old catalog state. Parsing is strict so
/// that arbitrary catalog YAML is not mistaken for a diff config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiffConfig {
    #[serde(default)]
    pub packages: Vec<DiffPackage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiffPackage {
    pub name: String,
    #[serde(
        rename = "defaultChannel",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub default_channel: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<DiffChannel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiffChannel {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub head: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bundles: Vec<String>,
}

impl DiffConfig {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Concatenate another config's packages onto this one.
    pub fn merge(&mut self, other: DiffConfig) {
        self.packages.extend(other.packages);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Skip config keys absent from the catalog instead of failing.
    pub permissive: bool,
    /// Include every channel head of every package in the new catalog.
    pub heads: bool,
    /// Close transitive dependencies of the selection.
    pub deps: bool,
    /// Walk the upgrade graph from each recorded head instead of
    /// intersecting recorded bundle sets.
    pub fill: bool,
}

/// Describe a rendered catalog as a diff config: per channel, the head and
/// the full bundle name list.
pub fn convert_to_diff_config(cfg: &DeclarativeConfig) -> Result<DiffConfig> {
    let m = convert::convert_to_model(cfg)?;
    let mut out = DiffConfig::default();
    for pkg in m.packages.values() {
        let mut dpkg = DiffPackage {
            name: pkg.name.clone(),
            default_channel: pkg.default_channel.clone(),
            channels: Vec::new(),
        };
        for ch in pkg.channels.values() {
            let head = ch.head()?;
            dpkg.channels.push(DiffChannel {
                name: ch.name.clone(),
                head: head.name.clone(),
                bundles: ch.bundles.keys().cloned().collect(),
            });
        }
        out.packages.push(dpkg);
    }
    Ok(out)
}

/// Compute the diff of `diff_cfg` against the catalog behind `idx`.
pub fn diff_index(
    idx: &PackageIndex,
    diff_cfg: &DiffConfig,
    opts: DiffOptions,
    cancel: &CancelToken,
) -> Result<Model> {
    let mut out = Model::new();

    if opts.heads {
        add_all_heads(idx, &mut out, cancel)?;
    }

    if opts.fill {
        fill_from_old_heads(idx, diff_cfg, &mut out, opts, cancel)?;
    } else {
        include_exact(idx, diff_cfg, &mut out, opts, cancel)?;
    }

    if opts.deps {
        deps::add_dependencies(idx, &mut out, cancel)?;
    }

    out.scrub_dangling_replaces();
    Ok(out)
}

/// Deposit the head of every channel of every indexed package into `out`.
pub(crate) fn add_all_heads(
    idx: &PackageIndex,
    out: &mut Model,
    cancel: &CancelToken,
) -> Result<()> {
    for pkg_name in idx.package_names() {
        cancel.check()?;
        let pkg = idx.load_package_model(&pkg_name)?;
        out.packages
            .entry(pkg_name.clone())
            .or_insert_with(|| pkg.copy_empty_channels());
        for ch in pkg.channels.values() {
            let head = ch.head()?;
            out.add_bundle(head.copy_to(&pkg.name, &ch.name));
        }
    }
    Ok(())
}

/// Exact selection: include the named packages, channels, and bundles that
/// exist in the new catalog. Empty channel lists select whole packages;
/// empty bundle lists select whole channels. Recorded heads are ignored,
/// so an entry without one is never an error here.
fn include_exact(
    idx: &PackageIndex,
    diff_cfg: &DiffConfig,
    out: &mut Model,
    opts: DiffOptions,
    cancel: &CancelToken,
) -> Result<()> {
    let pkg_names = idx.package_names();
    for dpkg in &diff_cfg.packages {
        cancel.check()?;
        if !pkg_names.contains(&dpkg.name) {
            if !opts.permissive {
                return Err(Error::MissingKey {
                    kind: KeyKind::Package,
                    key: dpkg.name.clone(),
                });
            }
            warn!(package = %dpkg.name, "skipping unknown package in diff config");
            continue;
        }
        let pkg = idx.load_package_model(&dpkg.name)?;
        out.packages
            .entry(dpkg.name.clone())
            .or_insert_with(|| pkg.copy_empty_channels());

        if dpkg.channels.is_empty() {
            for ch in pkg.channels.values() {
                for b in ch.bundles.values() {
                    out.add_bundle(b.clone());
                }
            }
        }
        for dch in &dpkg.channels {
            let ch = match pkg.channels.get(&dch.name) {
                Some(ch) => ch,
                None => {
                    if !opts.permissive {
                        return Err(Error::MissingKey {
                            kind: KeyKind::Channel,
                            key: dch.name.clone(),
                        });
                    }
                    warn!(channel = %dch.name, "skipping unknown channel in diff config");
                    continue;
                }
            };
            if dch.bundles.is_empty() {
                for b in ch.bundles.values() {
                    out.add_bundle(b.clone());
                }
            }
            for bname in &dch.bundles {
                match ch.bundles.get(bname) {
                    Some(b) => out.add_bundle(b.clone()),
                    None => {
                        if !opts.permissive {
                            return Err(Error::MissingKey {
                                kind: KeyKind::Bundle,
                                key: bname.clone(),
                            });
                        }
                        warn!(bundle = %bname, "skipping unknown bundle in diff config");
                    }
                }
            }
        }
        ensure_default_channel(out, &pkg);
    }
    Ok(())
}

/// Fill selection: per recorded channel, walk the upgrade graph of the new
/// catalog from the recorded head to the new head and select everything on
/// the way. A recorded channel without a head is an error.
fn fill_from_old_heads(
    idx: &PackageIndex,
    diff_cfg: &DiffConfig,
    out: &mut Model,
    opts: DiffOptions,
    cancel: &CancelToken,
) -> Result<()> {
    let pkg_names = idx.package_names();
    for dpkg in &diff_cfg.packages {
        cancel.check()?;
        if !pkg_names.contains(&dpkg.name) {
            if !opts.permissive {
                return Err(Error::MissingKey {
                    kind: KeyKind::Package,
                    key: dpkg.name.clone(),
                });
            }
            warn!(package = %dpkg.name, "skipping unknown package in diff config");
            continue;
        }
        let new_pkg = idx.load_package_model(&dpkg.name)?;
        out.packages
            .entry(dpkg.name.clone())
            .or_insert_with(|| new_pkg.copy_empty_channels());

        for dch in &dpkg.channels {
            // A channel gone from the new catalog has no upgrade graph to
            // walk; nothing to transfer.
            let new_ch = match new_pkg.channels.get(&dch.name) {
                Some(ch) => ch,
                None => continue,
            };
            if dch.head.is_empty() {
                return Err(Error::validation(
                    "diff config",
                    format!(
                        "package {:?} channel {:?} must specify a head bundle",
                        dpkg.name, dch.name
                    ),
                ));
            }
            if !new_ch.bundles.contains_key(&dch.head) {
                return Err(Error::validation(
                    "diff config",
                    format!(
                        "package {:?} channel {:?} head {:?} not found in catalog",
                        dpkg.name, dch.name, dch.head
                    ),
                ));
            }
            let new_head = new_ch.head()?;
            debug!(
                package = %dpkg.name,
                channel = %dch.name,
                old_head = %dch.head,
                new_head = %new_head.name,
                "filling channel"
            );
            let bundle_diff =
                model::diff::diff_channel_between_nodes(new_ch, &dch.head, &new_head.name)?;
            let copies: Vec<model::Bundle> = bundle_diff
                .into_iter()
                .map(|b| b.copy_to(&new_pkg.name, &new_ch.name))
                .collect();
            if let Some(out_pkg) = out.packages.get_mut(&dpkg.name) {
                out_pkg
                    .channels
                    .entry(dch.name.clone())
                    .or_insert_with(|| new_ch.copy_empty_bundles());
            }
            for b in copies {
                out.add_bundle(b);
            }
        }
        ensure_default_channel(out, &new_pkg);
    }
    Ok(())
}

/// Make sure the output package carries its default channel, inserting an
/// empty copy from the full catalog when the selection did not touch it.
pub(crate) fn ensure_default_channel(out: &mut Model, full_pkg: &model::Package) {
    if let Some(out_pkg) = out.packages.get_mut(&full_pkg.name) {
        if !out_pkg.channels.contains_key(&out_pkg.default_channel) {
            if let Some(def) = full_pkg.channels.get(&out_pkg.default_channel) {
                out_pkg
                    .channels
                    .insert(def.name.clone(), def.copy_empty_bundles());
            }
        }
    }
}
