// src/declcfg/mod.rs

//! Declarative catalog configuration: the flat on-disk document form.
//!
//! A declarative config is an ordered triple of package, bundle, and
//! schema-less "other" records, each a YAML or JSON document carrying a
//! `schema` field. This module holds the document types; submodules cover
//! conversion to and from the model, streaming load, canonical write, the
//! disk-spilled package index, and the diff/prune orchestration built on
//! top of it.

pub mod convert;
pub mod deps;
pub mod diff;
pub mod index;
pub mod load;
pub mod prune;
pub mod write;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::property::Property;

pub const SCHEMA_PACKAGE: &str = "olm.package";
pub const SCHEMA_BUNDLE: &str = "olm.bundle";

/// A package declaration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub schema: String,
    pub name: String,
    #[serde(rename = "defaultChannel", default)]
    pub default_channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// A package icon in wire form: base64 data plus a media type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    #[serde(rename = "base64data", default)]
    pub base64_data: String,
    #[serde(rename = "mediatype", default)]
    pub media_type: String,
}

/// A bundle document. `csv_json` and `objects` are populated by the
/// renderer and the model converter but never serialized; inline content
/// travels as `olm.bundle.object` properties instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub package: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
    #[serde(
        rename = "relatedImages",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub related_images: Vec<RelatedImage>,
    #[serde(skip)]
    pub csv_json: String,
    #[serde(skip)]
    pub objects: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedImage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub image: String,
}

/// A document with an unrecognized schema, preserved verbatim. The
/// `schema` and `package` fields are extracted for routing; `blob` is the
/// whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    pub schema: String,
    pub package: String,
    pub blob: Value,
}

impl Meta {
    pub fn from_value(blob: Value) -> Meta {
        let schema = blob
            .get("schema")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let package = blob
            .get("package")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Meta {
            schema,
            package,
            blob,
        }
    }
}

impl Serialize for Meta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.blob.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Meta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Meta::from_value(Value::deserialize(deserializer)?))
    }
}

/// The flat document form of a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarativeConfig {
    pub packages: Vec<Package>,
    pub bundles: Vec<Bundle>,
    pub others: Vec<Meta>,
}

impl DeclarativeConfig {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.bundles.is_empty() && self.others.is_empty()
    }

    /// Concatenate `other` onto this config, preserving input order.
    pub fn extend(&mut self, other: DeclarativeConfig) {
        self.packages.extend(other.packages);
        self.bundles.extend(other.bundles);
        self.others.extend(other.others);
    }
}

/// Concatenate configs in input order.
pub fn combine_configs(cfgs: Vec<DeclarativeConfig>) -> DeclarativeConfig {
    let mut out = DeclarativeConfig::default();
    for cfg in cfgs {
        out.extend(cfg);
    }
    out
}
