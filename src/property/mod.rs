// src/property/mod.rs

//! Typed view over a bundle's heterogeneous property list.
//!
//! Every bundle carries a flat list of `{type, value}` properties. This
//! module knows the recognized `olm.*` types, partitions a raw list into
//! typed buckets with [`parse`], reflects typed values back into raw
//! properties with [`build`], and deduplicates lists by `(type, canonical
//! value)`. Unknown types are preserved verbatim in the `others` bucket.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub const TYPE_PACKAGE: &str = "olm.package";
pub const TYPE_PACKAGE_REQUIRED: &str = "olm.package.required";
pub const TYPE_CHANNEL: &str = "olm.channel";
pub const TYPE_GVK: &str = "olm.gvk";
pub const TYPE_GVK_REQUIRED: &str = "olm.gvk.required";
pub const TYPE_SKIPS: &str = "olm.skips";
pub const TYPE_SKIP_RANGE: &str = "olm.skipRange";
pub const TYPE_BUNDLE_OBJECT: &str = "olm.bundle.object";

/// A raw property: a type tag and an opaque JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    #[serde(rename = "type")]
    pub typ: String,
    pub value: Value,
}

impl Property {
    /// The compact JSON rendering of the value. Object keys come out
    /// sorted, so equal values canonicalize to equal strings.
    pub fn canonical_value(&self) -> String {
        // Value cannot fail to serialize.
        serde_json::to_string(&self.value).unwrap_or_default()
    }

    /// Basic well-formedness: a non-empty type tag and a non-null value.
    pub fn validate(&self) -> Result<()> {
        if self.typ.is_empty() {
            return Err(Error::validation("property", "type must be set"));
        }
        if self.value.is_null() {
            return Err(Error::validation("property", "value must be set"));
        }
        Ok(())
    }
}

/// Values a typed property can be built from. The associated constant is
/// the registered type tag; registration happens at compile time by
/// implementing this trait, and the set of implementations is fixed at
/// startup.
pub trait TypedValue: Serialize {
    const TYPE: &'static str;
}

/// Reflect a typed value into a raw [`Property`] under its registered tag.
pub fn build<T: TypedValue>(value: &T) -> Result<Property> {
    Ok(Property {
        typ: T::TYPE.to_string(),
        value: serde_json::to_value(value)?,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageValue {
    pub package_name: String,
    pub version: String,
}

impl TypedValue for PackageValue {
    const TYPE: &'static str = TYPE_PACKAGE;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRequired {
    pub package_name: String,
    #[serde(default)]
    pub version_range: String,
}

impl TypedValue for PackageRequired {
    const TYPE: &'static str = TYPE_PACKAGE_REQUIRED;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelValue {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub replaces: String,
}

impl TypedValue for ChannelValue {
    const TYPE: &'static str = TYPE_CHANNEL;
}

/// A group/version/kind triple, used both for provided and required APIs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Gvk {
    pub group: String,
    pub kind: String,
    pub version: String,
}

impl TypedValue for Gvk {
    const TYPE: &'static str = TYPE_GVK;
}

impl std::fmt::Display for Gvk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.kind)
    }
}

/// Identical shape to [`Gvk`], under the required type tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GvkRequired {
    pub group: String,
    pub kind: String,
    pub version: String,
}

impl TypedValue for GvkRequired {
    const TYPE: &'static str = TYPE_GVK_REQUIRED;
}

impl From<GvkRequired> for Gvk {
    fn from(g: GvkRequired) -> Self {
        Gvk {
            group: g.group,
            kind: g.kind,
            version: g.version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Skips(pub String);

impl TypedValue for Skips {
    const TYPE: &'static str = TYPE_SKIPS;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkipRange(pub String);

impl TypedValue for SkipRange {
    const TYPE: &'static str = TYPE_SKIP_RANGE;
}

/// An inline or referenced bundle object. `ref` points at a file relative
/// to a declared root; `data` is base64-encoded content. The two fields
/// are mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleObject {
    #[serde(rename = "ref", default, skip_serializing_if = "String::is_empty")]
    pub reference: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
}

impl TypedValue for BundleObject {
    const TYPE: &'static str = TYPE_BUNDLE_OBJECT;
}

impl BundleObject {
    pub fn is_ref(&self) -> bool {
        !self.reference.is_empty()
    }

    fn validate(&self) -> Result<()> {
        if self.is_ref() && !self.data.is_empty() {
            return Err(Error::validation(
                "bundle object",
                "fields 'ref' and 'data' are mutually exclusive",
            ));
        }
        Ok(())
    }

    /// Resolve the object's content. Inline data is base64-decoded;
    /// references are resolved under `cwd` and must stay within `root`.
    pub fn get_data(&self, root: &Path, cwd: &Path) -> Result<Vec<u8>> {
        if !self.is_ref() {
            return BASE64
                .decode(&self.data)
                .map_err(|e| Error::validation("bundle object", format!("invalid base64 data: {e}")));
        }
        let reference = PathBuf::from(&self.reference);
        if reference.is_absolute() {
            return Err(Error::validation(
                "bundle object",
                "reference must be a relative path",
            ));
        }
        let root_abs = lexical_clean(&std::path::absolute(root)?);
        let ref_abs = lexical_clean(&std::path::absolute(cwd.join(&reference))?);
        if !ref_abs.starts_with(&root_abs) {
            return Err(Error::validation(
                "bundle object",
                format!(
                    "reference {} must be within root {}",
                    ref_abs.display(),
                    root_abs.display()
                ),
            ));
        }
        Ok(std::fs::read(&ref_abs)?)
    }
}

/// Resolve `.` and `..` components lexically, without touching the
/// filesystem. `..` at the root stays at the root.
fn lexical_clean(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(c) => out.push(c),
        }
    }
    out
}

/// The typed partition of a raw property list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    pub packages: Vec<PackageValue>,
    pub packages_required: Vec<PackageRequired>,
    pub channels: Vec<ChannelValue>,
    pub gvks: Vec<Gvk>,
    pub gvks_required: Vec<GvkRequired>,
    pub skips: Vec<String>,
    pub skip_ranges: Vec<String>,
    pub bundle_objects: Vec<BundleObject>,
    pub others: Vec<Property>,
}

/// Partition `input` into typed buckets. A value that fails to parse as its
/// declared type yields [`Error::Property`] carrying the list index.
pub fn parse(input: &[Property]) -> Result<Properties> {
    let mut out = Properties::default();
    for (index, prop) in input.iter().enumerate() {
        let type_err = |source| Error::Property {
            index,
            typ: prop.typ.clone(),
            source,
        };
        match prop.typ.as_str() {
            TYPE_PACKAGE => {
                let p: PackageValue =
                    serde_json::from_value(prop.value.clone()).map_err(type_err)?;
                out.packages.push(p);
            }
            TYPE_PACKAGE_REQUIRED => {
                let p: PackageRequired =
                    serde_json::from_value(prop.value.clone()).map_err(type_err)?;
                out.packages_required.push(p);
            }
            TYPE_CHANNEL => {
                let p: ChannelValue =
                    serde_json::from_value(prop.value.clone()).map_err(type_err)?;
                out.channels.push(p);
            }
            TYPE_GVK => {
                let p: Gvk = serde_json::from_value(prop.value.clone()).map_err(type_err)?;
                out.gvks.push(p);
            }
            TYPE_GVK_REQUIRED => {
                let p: GvkRequired =
                    serde_json::from_value(prop.value.clone()).map_err(type_err)?;
                out.gvks_required.push(p);
            }
            TYPE_SKIPS => {
                let p: Skips = serde_json::from_value(prop.value.clone()).map_err(type_err)?;
                out.skips.push(p.0);
            }
            TYPE_SKIP_RANGE => {
                let p: SkipRange =
                    serde_json::from_value(prop.value.clone()).map_err(type_err)?;
                out.skip_ranges.push(p.0);
            }
            TYPE_BUNDLE_OBJECT => {
                let p: BundleObject =
                    serde_json::from_value(prop.value.clone()).map_err(type_err)?;
                p.validate()?;
                out.bundle_objects.push(p);
            }
            _ => {
                out.others.push(prop.clone());
            }
        }
    }
    Ok(out)
}

/// Remove entries equal by `(type, canonical value)`, keeping the first
/// occurrence in order.
pub fn deduplicate(input: Vec<Property>) -> Vec<Property> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::with_capacity(input.len());
    for p in input {
        let key = (p.typ.clone(), p.canonical_value());
        if seen.insert(key) {
            out.push(p);
        }
    }
    out
}

/// Sort a property list by `(type, canonical value)` for deterministic
/// serialization.
pub fn sort_canonical(props: &mut [Property]) {
    props.sort_by(|a, b| {
        a.typ
            .cmp(&b.typ)
            .then_with(|| a.canonical_value().cmp(&b.canonical_value()))
    });
}

// Convenience constructors mirroring the typed value shapes. These cannot
// fail: the value types serialize unconditionally.

pub fn package(name: &str, version: &str) -> Property {
    must_build(&PackageValue {
        package_name: name.to_string(),
        version: version.to_string(),
    })
}

pub fn package_required(name: &str, version_range: &str) -> Property {
    must_build(&PackageRequired {
        package_name: name.to_string(),
        version_range: version_range.to_string(),
    })
}

pub fn channel(name: &str, replaces: &str) -> Property {
    must_build(&ChannelValue {
        name: name.to_string(),
        replaces: replaces.to_string(),
    })
}

pub fn gvk(group: &str, version: &str, kind: &str) -> Property {
    must_build(&Gvk {
        group: group.to_string(),
        kind: kind.to_string(),
        version: version.to_string(),
    })
}

pub fn gvk_required(group: &str, version: &str, kind: &str) -> Property {
    must_build(&GvkRequired {
        group: group.to_string(),
        kind: kind.to_string(),
        version: version.to_string(),
    })
}

pub fn skips(name: &str) -> Property {
    must_build(&Skips(name.to_string()))
}

pub fn skip_range(range: &str) -> Property {
    must_build(&SkipRange(range.to_string()))
}

pub fn bundle_object_ref(reference: &str) -> Property {
    must_build(&BundleObject {
        reference: reference.to_string(),
        data: String::new(),
    })
}

pub fn bundle_object_data(data: &[u8]) -> Property {
    must_build(&BundleObject {
        reference: String::new(),
        data: BASE64.encode(data),
    })
}

fn must_build<T: TypedValue>(value: &T) -> Property {
    // Serialization of the typed values is infallible.
    Property {
        typ: T::TYPE.to_string(),
        value: serde_json::to_value(value).unwrap_or(Value::Null),
    }
}
