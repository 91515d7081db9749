// src/declcfg/deps.rs

//! Dependency closure over required GVKs and required package ranges.
//!
//! Bundles declare requirements as `olm.gvk.required` and
//! `olm.package.required` properties. The resolver pages the full catalog
//! from the package index one package at a time, picks the highest-version
//! provider for each outstanding requirement, and copies it into the output
//! model. Requirements left over at the end are a hard error.

use std::collections::{BTreeMap, BTreeSet};

use semver::{Version, VersionReq};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::declcfg::index::PackageIndex;
use crate::error::{Error, Result};
use crate::model::{Bundle, Model, Package};
use crate::property::Gvk;

/// A required version range. The raw string is kept for reporting; an
/// empty string is the universal range. `||` alternatives each become one
/// requirement, and the range matches when any alternative does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeReq {
    pub raw: String,
    alternatives: Vec<VersionReq>,
}

impl RangeReq {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut alternatives = Vec::new();
        if !raw.trim().is_empty() {
            for alt in raw.split("||") {
                // Range syntax separates comparators with spaces; the
                // parser wants commas.
                let normalized = alt.split_whitespace().collect::<Vec<_>>().join(", ");
                alternatives.push(VersionReq::parse(&normalized)?);
            }
        }
        Ok(RangeReq {
            raw: raw.to_string(),
            alternatives,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        if self.alternatives.is_empty() {
            return true;
        }
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

/// Outstanding requirements gathered from a model.
#[derive(Debug, Default)]
pub struct Requirements {
    pub gvks: BTreeSet<Gvk>,
    pub packages: BTreeMap<String, Vec<RangeReq>>,
}

impl Requirements {
    pub fn is_empty(&self) -> bool {
        self.gvks.is_empty() && self.packages.is_empty()
    }
}

/// Collect every required GVK and required package range across `m`.
/// Distinct ranges for the same package accumulate; each must eventually
/// be covered by some provider.
pub fn collect_requirements(m: &Model) -> Result<Requirements> {
    let mut reqs = Requirements::default();
    for pkg in m.packages.values() {
        for ch in pkg.channels.values() {
            for b in ch.bundles.values() {
                for g in &b.props.gvks_required {
                    reqs.gvks.insert(g.clone().into());
                }
                for p in &b.props.packages_required {
                    let range = RangeReq::parse(&p.version_range)?;
                    let ranges = reqs.packages.entry(p.package_name.clone()).or_default();
                    if !ranges.contains(&range) {
                        ranges.push(range);
                    }
                }
            }
        }
    }
    Ok(reqs)
}

/// Close the dependencies of `out` against the full catalog behind `idx`.
///
/// Chosen bundles retain their original `replaces`; the caller scrubs
/// dangling pointers afterwards. Unsatisfied requirements are reported all
/// at once.
pub fn add_dependencies(idx: &PackageIndex, out: &mut Model, cancel: &CancelToken) -> Result<()> {
    let mut reqs = collect_requirements(out)?;
    if reqs.is_empty() {
        return Ok(());
    }

    for pkg_name in idx.package_names() {
        cancel.check()?;
        let pkg = idx.load_package_model(&pkg_name)?;
        for b in providing_bundles(&pkg, &mut reqs) {
            let already_present = out
                .packages
                .get(&b.package)
                .and_then(|p| p.channels.get(&b.channel))
                .is_some_and(|c| c.bundles.contains_key(&b.name));
            if already_present {
                continue;
            }
            if !out.packages.contains_key(&b.package) {
                out.packages
                    .insert(pkg.name.clone(), pkg.copy_empty_channels());
            }
            debug!(bundle = %b.name, package = %b.package, "adding dependency");
            out.add_bundle(b);
        }
    }

    if !reqs.is_empty() {
        return Err(Error::DependencyUnsatisfied {
            gvks: reqs.gvks.into_iter().collect(),
            packages: reqs.packages.into_keys().collect(),
        });
    }
    Ok(())
}

/// Pick providers from one package: the highest-version bundle per
/// satisfied GVK and per satisfied range. Version ties break to the
/// lexicographically smallest bundle name. Satisfied GVKs leave `reqs`
/// immediately; the package requirement leaves only once every one of its
/// ranges is covered.
pub fn providing_bundles(pkg: &Package, reqs: &mut Requirements) -> Vec<Bundle> {
    let ranges: Vec<RangeReq> = reqs.packages.get(&pkg.name).cloned().unwrap_or_default();
    let mut by_gvk: BTreeMap<Gvk, Vec<&Bundle>> = BTreeMap::new();
    let mut by_range: Vec<Vec<&Bundle>> = vec![Vec::new(); ranges.len()];

    for ch in pkg.channels.values() {
        for b in ch.bundles.values() {
            for g in &b.props.gvks {
                if reqs.gvks.contains(g) {
                    by_gvk.entry(g.clone()).or_default().push(b);
                }
            }
            for (i, range) in ranges.iter().enumerate() {
                if range.matches(&b.version) {
                    by_range[i].push(b);
                }
            }
        }
    }

    let mut chosen: BTreeMap<String, Bundle> = BTreeMap::new();
    for (g, mut candidates) in by_gvk {
        if let Some(best) = pick_latest(&mut candidates) {
            chosen.insert(best.name.clone(), best.clone());
            reqs.gvks.remove(&g);
        }
    }
    let mut all_ranges_covered = !ranges.is_empty();
    for mut candidates in by_range {
        match pick_latest(&mut candidates) {
            Some(best) => {
                chosen.insert(best.name.clone(), best.clone());
            }
            None => all_ranges_covered = false,
        }
    }
    if all_ranges_covered {
        reqs.packages.remove(&pkg.name);
    }

    chosen.into_values().collect()
}

/// Highest version wins; within a version tie, the lexicographically
/// smallest name wins.
fn pick_latest<'a>(candidates: &mut [&'a Bundle]) -> Option<&'a Bundle> {
    candidates.sort_by(|a, b| {
        a.version
            .cmp(&b.version)
            .then_with(|| b.name.cmp(&a.name))
    });
    candidates.last().copied()
}
