// src/model/diff.rs

//! Upgrade-chain diff over the replaces graph of a channel.
//!
//! The core primitive computes, within a single channel, the set of bundles
//! a consumer at an old head must receive to reach the new head along the
//! replaces graph. The package-level entry point applies it across two
//! rendered models.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::debug;

use crate::error::Result;
use crate::model::{Bundle, Channel, Model};

/// Compute the minimal bundle set needed to upgrade from `start` to `end`
/// within `ch`, which holds both old and new bundles.
///
/// The result never contains `start` or its ancestors below the chain
/// intersection, and always contains `end` (when `start != end`). When the
/// old and new chains share no bundle, there is no upgrade path to compute
/// and the entire channel is returned; callers rely on this fallback, so it
/// is part of the contract rather than an error.
pub fn diff_channel_between_nodes<'a>(
    ch: &'a Channel,
    start: &str,
    end: &str,
) -> Result<Vec<&'a Bundle>> {
    if start == end {
        return Ok(Vec::new());
    }

    // The old upgrade chain: start plus every transitive replaces target.
    let mut old_chain: BTreeSet<String> = BTreeSet::new();
    old_chain.insert(start.to_string());
    let mut next = ch.bundles.get(start);
    while let Some(b) = next {
        if b.replaces.is_empty() {
            break;
        }
        old_chain.insert(b.replaces.clone());
        next = ch.bundles.get(&b.replaces);
    }

    // Trace the new chain back from end until it meets the old chain.
    let mut intersection: Option<String> = None;
    let mut cursor = ch.bundles.get(end);
    while let Some(b) = cursor {
        if b.replaces.is_empty() {
            break;
        }
        if old_chain.contains(&b.replaces) {
            intersection = Some(b.replaces.clone());
            break;
        }
        cursor = ch.bundles.get(&b.replaces);
    }

    let intersection = match intersection {
        Some(name) => name,
        None => {
            // Disjoint chains: no minimal upgrade path exists between start
            // and end, so fall back to the full channel.
            debug!(
                channel = %ch.name,
                start, end, "old and new replaces chains are disjoint"
            );
            return Ok(ch.bundles.values().collect());
        }
    };

    // Reverse-replaces adjacency: replaced name -> replacing bundles.
    let mut replacers: BTreeMap<&str, Vec<&Bundle>> = BTreeMap::new();
    for b in ch.bundles.values() {
        if !b.replaces.is_empty() {
            replacers.entry(b.replaces.as_str()).or_default().push(b);
        }
    }

    // BFS from the intersection's direct replacers, collecting every
    // transitive replacer.
    let mut collected: BTreeMap<&str, &Bundle> = BTreeMap::new();
    let mut queue: VecDeque<&Bundle> = replacers
        .get(intersection.as_str())
        .map(|v| v.iter().copied().collect())
        .unwrap_or_default();
    while let Some(b) = queue.pop_front() {
        if collected.insert(b.name.as_str(), b).is_none() {
            if let Some(next) = replacers.get(b.name.as_str()) {
                queue.extend(next.iter().copied());
            }
        }
    }

    // Drop the bundles between start and the intersection: the consumer
    // already has them.
    let mut cur = start.to_string();
    while cur != intersection {
        collected.remove(cur.as_str());
        match ch.bundles.get(&cur) {
            Some(b) if !b.replaces.is_empty() => cur = b.replaces.clone(),
            _ => break,
        }
    }

    Ok(collected.into_values().collect())
}

/// Diff two rendered models by channel head.
///
/// For every package in `new`, channels also present in `old` contribute the
/// upgrade-chain diff between the old head and the new head; channels and
/// packages only present in `new` contribute their head alone. Packages only
/// present in `old` are dropped. The default channel always comes from the
/// new model.
pub fn diff_from_old_channel_heads(old: &Model, new: &Model) -> Result<Model> {
    let mut diff = Model::new();
    for (pkg_name, new_pkg) in &new.packages {
        debug!(package = %pkg_name, "diffing package");
        let mut diff_pkg = new_pkg.copy_empty_channels();
        let old_pkg = old.packages.get(pkg_name);
        for (ch_name, new_ch) in &new_pkg.channels {
            let mut diff_ch = new_ch.copy_empty_bundles();
            match old_pkg.and_then(|p| p.channels.get(ch_name)) {
                None => {
                    // The whole channel is new to the consumer; its head is
                    // the only content to transfer and replaces nothing.
                    let head = new_ch.head()?;
                    let mut b = head.copy_to(pkg_name, ch_name);
                    b.replaces.clear();
                    debug!(channel = %ch_name, head = %b.name, "new channel, shipping head");
                    diff_ch.bundles.insert(b.name.clone(), b);
                }
                Some(old_ch) => {
                    let old_head = old_ch.head()?;
                    let new_head = new_ch.head()?;
                    let bundles = if new_ch.bundles.contains_key(&old_head.name) {
                        diff_channel_between_nodes(new_ch, &old_head.name, &new_head.name)?
                    } else {
                        // The old head is unknown to the new channel, so no
                        // intersection can exist; same fallback as above.
                        new_ch.bundles.values().collect()
                    };
                    for b in bundles {
                        diff_ch
                            .bundles
                            .insert(b.name.clone(), b.copy_to(pkg_name, ch_name));
                    }
                }
            }
            diff_pkg.channels.insert(ch_name.clone(), diff_ch);
        }
        diff.packages.insert(pkg_name.clone(), diff_pkg);
    }
    Ok(diff)
}
