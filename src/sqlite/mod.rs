// src/sqlite/mod.rs

//! Legacy indexed-database reader.
//!
//! Old catalogs ship as a sqlite file with package / channel /
//! channel_entry / operatorbundle tables. This module reads that schema
//! and emits the declarative equivalent one package at a time. The
//! [`Query`] trait is the surface a serving process binds against; the
//! engine itself only needs [`SqliteQuerier`] and [`package_to_config`].

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use tracing::debug;

use crate::declcfg::{self, DeclarativeConfig, SCHEMA_BUNDLE, SCHEMA_PACKAGE};
use crate::error::{Error, Result};
use crate::property::{self, Property};

/// Read-side interface over an indexed database, consumed by the serving
/// collaborator.
pub trait Query {
    fn list_tables(&self) -> Result<Vec<String>>;
    fn list_packages(&self) -> Result<Vec<String>>;
    fn get_bundle(&self, package: &str, channel: &str, name: &str) -> Result<declcfg::Bundle>;
}

/// A read-only handle on a legacy indexed database.
pub struct SqliteQuerier {
    conn: Connection,
}

impl SqliteQuerier {
    /// Open `path` read-only. The file must already exist.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(SqliteQuerier { conn })
    }

    fn default_channel(&self, pkg_name: &str) -> Result<String> {
        let row: Option<String> = self
            .conn
            .query_row(
                "SELECT default_channel FROM package WHERE name = ?1",
                params![pkg_name],
                |row| row.get(0),
            )
            .optional()?;
        row.ok_or_else(|| {
            Error::validation(
                format!("package {pkg_name:?}"),
                "not found in indexed database",
            )
        })
    }

    fn channels(&self, pkg_name: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM channel WHERE package_name = ?1 ORDER BY name")?;
        let rows = stmt.query_map(params![pkg_name], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Channel memberships: bundle name -> replaced bundle name, derived
    /// from the entry at the smallest depth per bundle.
    fn channel_memberships(
        &self,
        pkg_name: &str,
        channel: &str,
    ) -> Result<BTreeMap<String, String>> {
        let mut stmt = self.conn.prepare(
            "SELECT e.operatorbundle_name, r.operatorbundle_name, e.depth
             FROM channel_entry e
             LEFT JOIN channel_entry r ON e.replaces = r.entry_id
             WHERE e.package_name = ?1 AND e.channel_name = ?2
             ORDER BY e.depth",
        )?;
        let rows = stmt.query_map(params![pkg_name, channel], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        let mut memberships: BTreeMap<String, String> = BTreeMap::new();
        for row in rows {
            let (bundle, replaces, _depth) = row?;
            // Rows arrive depth-ascending; keep the shallowest entry.
            memberships
                .entry(bundle)
                .or_insert_with(|| replaces.unwrap_or_default());
        }
        Ok(memberships)
    }

    fn bundle_row(&self, name: &str) -> Result<BundleRow> {
        let row = self
            .conn
            .query_row(
                "SELECT name, version, skiprange, csv, bundle, bundlepath
                 FROM operatorbundle WHERE name = ?1",
                params![name],
                |row| {
                    Ok(BundleRow {
                        name: row.get(0)?,
                        version: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        skip_range: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        csv: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        objects: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        bundle_path: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        row.ok_or_else(|| {
            Error::validation(format!("bundle {name:?}"), "not found in indexed database")
        })
    }

    fn stored_properties(&self, bundle_name: &str) -> Result<Vec<Property>> {
        self.typed_rows("properties", bundle_name)
    }

    fn stored_dependencies(&self, bundle_name: &str) -> Result<Vec<Property>> {
        let deps = self.typed_rows("dependencies", bundle_name)?;
        let mut out = Vec::new();
        for dep in deps {
            match dep.typ.as_str() {
                property::TYPE_GVK => {
                    // Stored dependencies use the provided-GVK tag; they
                    // mean a requirement.
                    out.push(Property {
                        typ: property::TYPE_GVK_REQUIRED.to_string(),
                        value: dep.value,
                    });
                }
                property::TYPE_PACKAGE => {
                    let name = dep
                        .value
                        .get("packageName")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let range = dep
                        .value
                        .get("version")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    out.push(property::package_required(name, range));
                }
                _ => out.push(dep),
            }
        }
        Ok(out)
    }

    fn typed_rows(&self, table: &str, bundle_name: &str) -> Result<Vec<Property>> {
        if !self.has_table(table)? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(&format!(
            "SELECT type, value FROM {table} WHERE operatorbundle_name = ?1"
        ))?;
        let rows = stmt.query_map(params![bundle_name], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (typ, raw) = row?;
            let value: Value = serde_json::from_str(&raw)?;
            out.push(Property { typ, value });
        }
        Ok(out)
    }

    fn related_images(&self, bundle_name: &str) -> Result<Vec<String>> {
        if !self.has_table("related_image")? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT image FROM related_image WHERE operatorbundle_name = ?1 ORDER BY image",
        )?;
        let rows = stmt.query_map(params![bundle_name], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn has_table(&self, name: &str) -> Result<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

struct BundleRow {
    name: String,
    version: String,
    skip_range: String,
    csv: String,
    objects: String,
    bundle_path: String,
}

impl Query for SqliteQuerier {
    fn list_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn list_packages(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM package ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn get_bundle(&self, package: &str, channel: &str, name: &str) -> Result<declcfg::Bundle> {
        let cfg = package_to_config(self, package)?;
        cfg.bundles
            .into_iter()
            .find(|b| b.name == name && has_channel_property(b, channel))
            .ok_or_else(|| {
                Error::validation(
                    format!("bundle {name:?}"),
                    format!("not found in package {package:?} channel {channel:?}"),
                )
            })
    }
}

fn has_channel_property(b: &declcfg::Bundle, channel: &str) -> bool {
    b.properties.iter().any(|p| {
        p.typ == property::TYPE_CHANNEL
            && p.value.get("name").and_then(Value::as_str) == Some(channel)
    })
}

/// Emit one package of the legacy database as a declarative config.
pub fn package_to_config(q: &SqliteQuerier, pkg_name: &str) -> Result<DeclarativeConfig> {
    let default_channel = q.default_channel(pkg_name)?;
    let mut cfg = DeclarativeConfig {
        packages: vec![declcfg::Package {
            schema: SCHEMA_PACKAGE.to_string(),
            name: pkg_name.to_string(),
            default_channel,
            ..Default::default()
        }],
        ..Default::default()
    };

    // channel name -> (bundle name -> replaces)
    let mut memberships: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for ch in q.channels(pkg_name)? {
        let members = q.channel_memberships(pkg_name, &ch)?;
        memberships.insert(ch, members);
    }

    // bundle name -> channel properties
    let mut channel_props: BTreeMap<String, Vec<Property>> = BTreeMap::new();
    for (ch, members) in &memberships {
        for (bundle, replaces) in members {
            channel_props
                .entry(bundle.clone())
                .or_default()
                .push(property::channel(ch, replaces));
        }
    }

    for (bundle_name, ch_props) in channel_props {
        let row = q.bundle_row(&bundle_name)?;
        debug!(bundle = %bundle_name, package = %pkg_name, "loaded legacy bundle");

        let mut properties = ch_props;
        let stored = q.stored_properties(&bundle_name)?;
        let has_stored_package = stored.iter().any(|p| p.typ == property::TYPE_PACKAGE);
        properties.extend(stored);
        properties.extend(q.stored_dependencies(&bundle_name)?);

        let (csv_json, objects, csv_version) = decode_objects(&row);
        let version = if row.version.is_empty() {
            csv_version
        } else {
            row.version.clone()
        };
        if !has_stored_package {
            properties.push(property::package(pkg_name, &version));
        }
        if !row.skip_range.is_empty() {
            properties.push(property::skip_range(&row.skip_range));
        }

        let mut related_images: Vec<declcfg::RelatedImage> = q
            .related_images(&bundle_name)?
            .into_iter()
            .map(|image| declcfg::RelatedImage {
                name: String::new(),
                image,
            })
            .collect();
        if !row.bundle_path.is_empty()
            && !related_images.iter().any(|ri| ri.image == row.bundle_path)
        {
            related_images.push(declcfg::RelatedImage {
                name: String::new(),
                image: row.bundle_path.clone(),
            });
        }

        cfg.bundles.push(declcfg::Bundle {
            schema: SCHEMA_BUNDLE.to_string(),
            name: row.name,
            package: pkg_name.to_string(),
            image: row.bundle_path,
            properties: property::deduplicate(properties),
            related_images,
            csv_json,
            objects,
        });
    }

    Ok(cfg)
}

/// Split the stored object stream into individual documents and pull the
/// version out of the CSV as a fallback for old databases without a
/// version column.
fn decode_objects(row: &BundleRow) -> (String, Vec<String>, String) {
    let mut objects = Vec::new();
    if !row.objects.is_empty() {
        for doc in serde_json::Deserializer::from_str(&row.objects).into_iter::<Value>() {
            match doc {
                Ok(v) => match serde_json::to_string(&v) {
                    Ok(s) => objects.push(s),
                    Err(_) => continue,
                },
                Err(_) => break,
            }
        }
    }
    let csv_version = serde_json::from_str::<Value>(&row.csv)
        .ok()
        .and_then(|v| {
            v.pointer("/spec/version")
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_default();
    if objects.is_empty() && !row.csv.is_empty() {
        objects.push(row.csv.clone());
    }
    (row.csv.clone(), objects, csv_version)
}
