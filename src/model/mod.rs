// src/model/mod.rs

//! In-memory catalog model: packages, channels, bundles.
//!
//! The model is the working form of a catalog. Ownership flows one way
//! (model -> package -> channel -> bundle) and children refer back to their
//! parents by name, so copies stay cheap and no pointer bookkeeping is
//! needed. All collections are ordered maps, which makes every traversal
//! deterministic.

pub mod diff;

use std::collections::{BTreeMap, BTreeSet};

use semver::Version;

use crate::error::{Error, Result};
use crate::property::{self, Properties, Property};

/// A package icon: raw bytes plus a media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub data: Vec<u8>,
    pub media_type: String,
}

/// An image referenced by a bundle, e.g. the operator binary image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedImage {
    pub name: String,
    pub image: String,
}

/// A versioned, installable artifact within one channel of one package.
///
/// A bundle that is a member of several channels appears as one `Bundle`
/// per channel, sharing its name but carrying a different `channel`
/// back-reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub name: String,
    /// Name of the owning package.
    pub package: String,
    /// Name of the owning channel.
    pub channel: String,
    pub image: String,
    /// Name of the bundle this one upgrades from; empty at chain tails.
    pub replaces: String,
    /// Bundles this one also supersedes off the primary replaces chain.
    pub skips: Vec<String>,
    pub version: Version,
    pub properties: Vec<Property>,
    /// Typed view of `properties`, parsed once at construction.
    pub props: Properties,
    pub related_images: Vec<RelatedImage>,
    pub csv_json: Option<String>,
    pub objects: Vec<String>,
}

impl Bundle {
    /// An empty bundle at version 0.0.0, for incremental construction.
    pub fn new(name: &str, package: &str, channel: &str) -> Self {
        Bundle {
            name: name.to_string(),
            package: package.to_string(),
            channel: channel.to_string(),
            image: String::new(),
            replaces: String::new(),
            skips: Vec::new(),
            version: Version::new(0, 0, 0),
            properties: Vec::new(),
            props: Properties::default(),
            related_images: Vec::new(),
            csv_json: None,
            objects: Vec::new(),
        }
    }

    /// Clone this bundle into another package/channel location, keeping
    /// content (including `replaces`) intact.
    pub fn copy_to(&self, package: &str, channel: &str) -> Bundle {
        let mut cp = self.clone();
        cp.package = package.to_string();
        cp.channel = channel.to_string();
        cp
    }

    fn validate(&self, pkg: &Package, ch: &Channel) -> Result<()> {
        let scope = format!("bundle {:?}", self.name);
        if self.name.is_empty() {
            return Err(Error::validation("bundle", "name must be set"));
        }
        if self.package != pkg.name {
            return Err(Error::validation(
                scope,
                format!(
                    "package back-reference is {:?}, expected {:?}",
                    self.package, pkg.name
                ),
            ));
        }
        if self.channel != ch.name {
            return Err(Error::validation(
                scope,
                format!(
                    "channel back-reference is {:?}, expected {:?}",
                    self.channel, ch.name
                ),
            ));
        }
        if !self.replaces.is_empty() && !ch.bundles.contains_key(&self.replaces) {
            return Err(Error::validation(
                scope,
                format!(
                    "replaces {:?} not present in channel {:?}",
                    self.replaces, ch.name
                ),
            ));
        }
        Ok(())
    }
}

/// A named upgrade stream within a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    /// Name of the owning package.
    pub package: String,
    pub bundles: BTreeMap<String, Bundle>,
}

impl Channel {
    pub fn new(name: &str, package: &str) -> Self {
        Channel {
            name: name.to_string(),
            package: package.to_string(),
            bundles: BTreeMap::new(),
        }
    }

    /// A copy of this channel with an empty bundle map.
    pub fn copy_empty_bundles(&self) -> Channel {
        Channel {
            name: self.name.clone(),
            package: self.package.clone(),
            bundles: BTreeMap::new(),
        }
    }

    /// The channel head: the unique bundle not named by any other bundle's
    /// `replaces` or `skips` within this channel. Zero or multiple
    /// candidates is a validity error.
    pub fn head(&self) -> Result<&Bundle> {
        let mut candidates: BTreeSet<&str> = self.bundles.keys().map(String::as_str).collect();
        for b in self.bundles.values() {
            if !b.replaces.is_empty() {
                candidates.remove(b.replaces.as_str());
            }
            for s in &b.skips {
                candidates.remove(s.as_str());
            }
        }
        let scope = format!("channel {:?}", self.name);
        match candidates.len() {
            1 => {
                let name = candidates.iter().next().copied().unwrap_or_default();
                self.bundles
                    .get(name)
                    .ok_or_else(|| Error::validation(scope, "head candidate missing from channel"))
            }
            0 => Err(Error::validation(scope, "no channel head found")),
            _ => {
                let names: Vec<&str> = candidates.into_iter().collect();
                Err(Error::validation(
                    scope,
                    format!("multiple channel heads found: {}", names.join(", ")),
                ))
            }
        }
    }

    fn validate(&self, pkg: &Package) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::validation("channel", "name must be set"));
        }
        let scope = format!("channel {:?}", self.name);
        if self.package != pkg.name {
            return Err(Error::validation(
                scope,
                format!(
                    "package back-reference is {:?}, expected {:?}",
                    self.package, pkg.name
                ),
            ));
        }
        self.head()?;
        for b in self.bundles.values() {
            b.validate(pkg, self)?;
        }
        self.validate_replaces_acyclic()?;
        Ok(())
    }

    fn validate_replaces_acyclic(&self) -> Result<()> {
        for start in self.bundles.values() {
            let mut seen: BTreeSet<&str> = BTreeSet::new();
            let mut current = start;
            while !current.replaces.is_empty() {
                if !seen.insert(current.name.as_str()) {
                    return Err(Error::validation(
                        format!("channel {:?}", self.name),
                        format!("replaces cycle through bundle {:?}", current.name),
                    ));
                }
                match self.bundles.get(&current.replaces) {
                    Some(next) => current = next,
                    None => break,
                }
            }
        }
        Ok(())
    }
}

/// A named package: channels plus a distinguished default channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub description: String,
    pub icon: Option<Icon>,
    /// Name of the default channel; must be a key of `channels`.
    pub default_channel: String,
    pub channels: BTreeMap<String, Channel>,
}

impl Package {
    pub fn new(name: &str) -> Self {
        Package {
            name: name.to_string(),
            description: String::new(),
            icon: None,
            default_channel: String::new(),
            channels: BTreeMap::new(),
        }
    }

    /// A copy of this package carrying metadata and the default-channel
    /// name, but no channels.
    pub fn copy_empty_channels(&self) -> Package {
        Package {
            name: self.name.clone(),
            description: self.description.clone(),
            icon: self.icon.clone(),
            default_channel: self.default_channel.clone(),
            channels: BTreeMap::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::validation("package", "name must be set"));
        }
        let scope = format!("package {:?}", self.name);
        if self.channels.is_empty() {
            return Err(Error::validation(
                scope,
                "package must have at least one channel",
            ));
        }
        if self.default_channel.is_empty() {
            return Err(Error::validation(scope, "default channel must be set"));
        }
        if !self.channels.contains_key(&self.default_channel) {
            return Err(Error::validation(
                scope,
                format!(
                    "default channel {:?} not found in channels",
                    self.default_channel
                ),
            ));
        }
        for ch in self.channels.values() {
            ch.validate(self)?;
        }
        Ok(())
    }
}

/// The root of the catalog model: an ordered map of packages by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    pub packages: BTreeMap<String, Package>,
}

impl Model {
    pub fn new() -> Self {
        Model::default()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Insert or replace a bundle, creating empty package and channel
    /// skeletons with back-references as needed.
    pub fn add_bundle(&mut self, b: Bundle) {
        let pkg = self
            .packages
            .entry(b.package.clone())
            .or_insert_with(|| Package::new(&b.package));
        let ch = pkg
            .channels
            .entry(b.channel.clone())
            .or_insert_with(|| Channel::new(&b.channel, &b.package));
        ch.bundles.insert(b.name.clone(), b);
    }

    /// Enforce every model invariant: default channels, exactly-one heads,
    /// back-references, in-channel replaces targets, acyclic replaces.
    pub fn validate(&self) -> Result<()> {
        for pkg in self.packages.values() {
            pkg.validate()?;
        }
        Ok(())
    }

    /// Clear `replaces` on every bundle whose target is not present in the
    /// same channel. Run after diff/prune truncate channels.
    pub fn scrub_dangling_replaces(&mut self) {
        for pkg in self.packages.values_mut() {
            for ch in pkg.channels.values_mut() {
                let names: BTreeSet<String> = ch.bundles.keys().cloned().collect();
                for b in ch.bundles.values_mut() {
                    if !b.replaces.is_empty() && !names.contains(&b.replaces) {
                        b.replaces.clear();
                    }
                }
            }
        }
    }

    /// Total number of bundles across all packages and channels.
    pub fn bundle_count(&self) -> usize {
        self.packages
            .values()
            .flat_map(|p| p.channels.values())
            .map(|c| c.bundles.len())
            .sum()
    }
}

/// Build a bundle from its constituent parts, parsing the property list
/// into the typed view. The version comes from the `olm.package` property.
#[allow(clippy::too_many_arguments)]
pub fn bundle_from_parts(
    name: &str,
    package: &str,
    channel: &str,
    image: &str,
    replaces: &str,
    properties: Vec<Property>,
    related_images: Vec<RelatedImage>,
    csv_json: Option<String>,
    objects: Vec<String>,
) -> Result<Bundle> {
    let props = property::parse(&properties)?;
    let scope = format!("bundle {name:?}");
    let pkg_prop = match props.packages.as_slice() {
        [single] => single,
        [] => {
            return Err(Error::validation(
                scope,
                format!(
                    "must have exactly one {:?} property, found none",
                    property::TYPE_PACKAGE
                ),
            ))
        }
        many => {
            return Err(Error::validation(
                scope,
                format!(
                    "must have exactly one {:?} property, found {}",
                    property::TYPE_PACKAGE,
                    many.len()
                ),
            ))
        }
    };
    if pkg_prop.package_name != package {
        return Err(Error::validation(
            scope,
            format!(
                "package property names {:?}, expected {:?}",
                pkg_prop.package_name, package
            ),
        ));
    }
    let version = Version::parse(&pkg_prop.version).map_err(|e| {
        Error::validation(
            format!("bundle {name:?}"),
            format!("invalid version {:?}: {e}", pkg_prop.version),
        )
    })?;
    let skips = props.skips.clone();
    Ok(Bundle {
        name: name.to_string(),
        package: package.to_string(),
        channel: channel.to_string(),
        image: image.to_string(),
        replaces: replaces.to_string(),
        skips,
        version,
        properties,
        props,
        related_images,
        csv_json,
        objects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replacing_bundle(name: &str, replaces: &str, skips: &[&str]) -> Bundle {
        let mut b = Bundle::new(name, "anakin", "stable");
        b.replaces = replaces.to_string();
        b.skips = skips.iter().map(|s| s.to_string()).collect();
        b
    }

    fn channel_of(bundles: Vec<Bundle>) -> Channel {
        let mut ch = Channel::new("stable", "anakin");
        for b in bundles {
            ch.bundles.insert(b.name.clone(), b);
        }
        ch
    }

    #[test]
    fn test_head_by_elimination() {
        let ch = channel_of(vec![
            replacing_bundle("anakin.v0.1.0", "", &[]),
            replacing_bundle("anakin.v0.2.0", "anakin.v0.1.0", &[]),
        ]);
        assert_eq!(ch.head().unwrap().name, "anakin.v0.2.0");
    }

    #[test]
    fn test_head_respects_skips() {
        let ch = channel_of(vec![
            replacing_bundle("anakin.v0.1.0", "", &[]),
            replacing_bundle("anakin.v0.1.1", "anakin.v0.1.0", &[]),
            replacing_bundle("anakin.v0.2.0", "anakin.v0.1.0", &["anakin.v0.1.1"]),
        ]);
        assert_eq!(ch.head().unwrap().name, "anakin.v0.2.0");
    }

    #[test]
    fn test_head_multiple_is_error() {
        let ch = channel_of(vec![
            replacing_bundle("anakin.v0.1.0", "", &[]),
            replacing_bundle("anakin.v0.2.0", "", &[]),
        ]);
        let err = ch.head().unwrap_err();
        assert!(err.to_string().contains("multiple channel heads"));
    }

    #[test]
    fn test_head_empty_channel_is_error() {
        let ch = channel_of(vec![]);
        assert!(ch.head().is_err());
    }

    #[test]
    fn test_add_bundle_creates_skeletons() {
        let mut m = Model::new();
        m.add_bundle(replacing_bundle("anakin.v0.1.0", "", &[]));
        let pkg = m.packages.get("anakin").unwrap();
        let ch = pkg.channels.get("stable").unwrap();
        assert_eq!(ch.package, "anakin");
        assert!(ch.bundles.contains_key("anakin.v0.1.0"));
    }

    #[test]
    fn test_validate_missing_default_channel() {
        let mut m = Model::new();
        m.add_bundle(replacing_bundle("anakin.v0.1.0", "", &[]));
        let err = m.validate().unwrap_err();
        assert!(err.to_string().contains("default channel"));
    }

    #[test]
    fn test_validate_dangling_replaces() {
        let mut m = Model::new();
        m.add_bundle(replacing_bundle("anakin.v0.2.0", "anakin.v0.1.0", &[]));
        if let Some(pkg) = m.packages.get_mut("anakin") {
            pkg.default_channel = "stable".to_string();
        }
        let err = m.validate().unwrap_err();
        assert!(err.to_string().contains("replaces"));
    }

    #[test]
    fn test_validate_replaces_cycle() {
        let mut m = Model::new();
        m.add_bundle(replacing_bundle("anakin.v0.1.0", "anakin.v0.2.0", &[]));
        m.add_bundle(replacing_bundle("anakin.v0.2.0", "anakin.v0.1.0", &[]));
        if let Some(pkg) = m.packages.get_mut("anakin") {
            pkg.default_channel = "stable".to_string();
        }
        let err = m.validate().unwrap_err();
        // A two-cycle also leaves the channel headless; either message
        // identifies the broken channel.
        let msg = err.to_string();
        assert!(msg.contains("cycle") || msg.contains("head"), "unexpected: {msg}");
    }

    #[test]
    fn test_scrub_dangling_replaces() {
        let mut m = Model::new();
        m.add_bundle(replacing_bundle("anakin.v0.2.0", "anakin.v0.1.0", &[]));
        m.scrub_dangling_replaces();
        let b = &m.packages["anakin"].channels["stable"].bundles["anakin.v0.2.0"];
        assert!(b.replaces.is_empty());
    }

    #[test]
    fn test_bundle_from_parts_requires_version() {
        let err = bundle_from_parts(
            "anakin.v0.1.0",
            "anakin",
            "stable",
            "",
            "",
            vec![crate::property::package("anakin", "not-a-version")],
            Vec::new(),
            None,
            Vec::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid version"));
    }
}
