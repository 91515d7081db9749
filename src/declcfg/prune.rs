// src/declcfg/prune.rs

//! Prune orchestration over an indexed catalog.
//!
//! Keep mode starts from nothing and selects only the named entries
//! (optionally plus every channel head); remove mode starts from the whole
//! catalog and deletes the named entries, collapsing channels and packages
//! that empty out. Both close dependencies against the full catalog and
//! scrub dangling replaces, so the result stays installable.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cancel::CancelToken;
use crate::declcfg::deps;
use crate::declcfg::diff::{add_all_heads, ensure_default_channel};
use crate::declcfg::index::PackageIndex;
use crate::error::{Error, KeyKind, Result};
use crate::model::Model;

/// Serialized selection of packages, channels, and bundles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneConfig {
    #[serde(default)]
    pub packages: Vec<PrunePackage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrunePackage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<PruneChannel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneChannel {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bundles: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PruneOptions {
    /// Interpret the config as an allow-list instead of a removal list.
    pub keep: bool,
    /// In keep mode, also keep every channel head of every package.
    pub heads: bool,
    /// Skip config keys absent from the catalog instead of failing.
    pub permissive: bool,
}

/// Prune the catalog behind `idx` according to `cfg`.
pub fn prune_index(
    idx: &PackageIndex,
    cfg: &PruneConfig,
    opts: PruneOptions,
    cancel: &CancelToken,
) -> Result<Model> {
    let mut out = if opts.keep {
        keep_selection(idx, cfg, opts, cancel)?
    } else {
        remove_selection(idx, cfg, opts, cancel)?
    };
    deps::add_dependencies(idx, &mut out, cancel)?;
    out.scrub_dangling_replaces();
    Ok(out)
}

/// Allow-list selection. An empty channel list keeps the whole package; an
/// empty bundle list keeps the whole channel.
fn keep_selection(
    idx: &PackageIndex,
    cfg: &PruneConfig,
    opts: PruneOptions,
    cancel: &CancelToken,
) -> Result<Model> {
    let mut out = Model::new();
    if opts.heads {
        add_all_heads(idx, &mut out, cancel)?;
    }
    let pkg_names = idx.package_names();
    for ppkg in &cfg.packages {
        cancel.check()?;
        if !pkg_names.contains(&ppkg.name) {
            if !opts.permissive {
                return Err(Error::MissingKey {
                    kind: KeyKind::Package,
                    key: ppkg.name.clone(),
                });
            }
            warn!(package = %ppkg.name, "skipping unknown package in prune config");
            continue;
        }
        let pkg = idx.load_package_model(&ppkg.name)?;
        out.packages
            .entry(ppkg.name.clone())
            .or_insert_with(|| pkg.copy_empty_channels());

        if ppkg.channels.is_empty() {
            for ch in pkg.channels.values() {
                for b in ch.bundles.values() {
                    out.add_bundle(b.clone());
                }
            }
        }
        for pch in &ppkg.channels {
            let ch = match pkg.channels.get(&pch.name) {
                Some(ch) => ch,
                None => {
                    if !opts.permissive {
                        return Err(Error::MissingKey {
                            kind: KeyKind::Channel,
                            key: pch.name.clone(),
                        });
                    }
                    warn!(channel = %pch.name, "skipping unknown channel in prune config");
                    continue;
                }
            };
            if pch.bundles.is_empty() {
                for b in ch.bundles.values() {
                    out.add_bundle(b.clone());
                }
            }
            for bname in &pch.bundles {
                match ch.bundles.get(bname) {
                    Some(b) => out.add_bundle(b.clone()),
                    None => {
                        if !opts.permissive {
                            return Err(Error::MissingKey {
                                kind: KeyKind::Bundle,
                                key: bname.clone(),
                            });
                        }
                        warn!(bundle = %bname, "skipping unknown bundle in prune config");
                    }
                }
            }
        }
        ensure_default_channel(&mut out, &pkg);
    }
    Ok(out)
}

/// Removal selection. An empty channel list removes the whole package; an
/// empty bundle list removes the whole channel. Channels and packages that
/// empty out disappear with their contents.
fn remove_selection(
    idx: &PackageIndex,
    cfg: &PruneConfig,
    opts: PruneOptions,
    cancel: &CancelToken,
) -> Result<Model> {
    let mut out = Model::new();
    for pkg_name in idx.package_names() {
        cancel.check()?;
        let pkg = idx.load_package_model(&pkg_name)?;
        out.packages.insert(pkg_name, pkg);
    }

    for ppkg in &cfg.packages {
        if !out.packages.contains_key(&ppkg.name) {
            if !opts.permissive {
                return Err(Error::MissingKey {
                    kind: KeyKind::Package,
                    key: ppkg.name.clone(),
                });
            }
            warn!(package = %ppkg.name, "skipping unknown package in prune config");
            continue;
        }
        if ppkg.channels.is_empty() {
            out.packages.remove(&ppkg.name);
            continue;
        }
        let mut missing: Option<Error> = None;
        let mut package_empty = false;
        if let Some(pkg) = out.packages.get_mut(&ppkg.name) {
            for pch in &ppkg.channels {
                if !pkg.channels.contains_key(&pch.name) {
                    if !opts.permissive {
                        missing = Some(Error::MissingKey {
                            kind: KeyKind::Channel,
                            key: pch.name.clone(),
                        });
                        break;
                    }
                    warn!(channel = %pch.name, "skipping unknown channel in prune config");
                    continue;
                }
                if pch.bundles.is_empty() {
                    pkg.channels.remove(&pch.name);
                    continue;
                }
                let mut channel_empty = false;
                if let Some(ch) = pkg.channels.get_mut(&pch.name) {
                    for bname in &pch.bundles {
                        if ch.bundles.remove(bname).is_none() {
                            if !opts.permissive {
                                missing = Some(Error::MissingKey {
                                    kind: KeyKind::Bundle,
                                    key: bname.clone(),
                                });
                                break;
                            }
                            warn!(bundle = %bname, "skipping unknown bundle in prune config");
                        }
                    }
                    channel_empty = ch.bundles.is_empty();
                }
                if missing.is_some() {
                    break;
                }
                if channel_empty {
                    pkg.channels.remove(&pch.name);
                }
            }
            package_empty = pkg.channels.is_empty();
        }
        if let Some(err) = missing {
            return Err(err);
        }
        if package_empty {
            out.packages.remove(&ppkg.name);
        }
    }
    Ok(out)
}
