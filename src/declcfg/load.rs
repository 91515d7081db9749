// src/declcfg/load.rs

//! Streaming reader for declarative-config trees.
//!
//! Every regular file under a root may hold a YAML document stream or a
//! sequence of JSON documents. Documents are classified by their `schema`
//! field; files that cannot be decoded at all are skipped, not rejected.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::declcfg::{DeclarativeConfig, Meta, SCHEMA_BUNDLE, SCHEMA_PACKAGE};
use crate::error::Result;

/// Load every declarative document found under `root`.
pub fn load_fs(root: &Path) -> Result<DeclarativeConfig> {
    let mut cfg = DeclarativeConfig::default();
    walk_files(root, |path, text| {
        let docs = match documents_in(text) {
            Ok(docs) => docs,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping undecodable file");
                return Ok(());
            }
        };
        for doc in docs {
            accumulate(doc, &mut cfg)?;
        }
        Ok(())
    })?;
    Ok(cfg)
}

/// Walk every regular file under `root` in path order and hand its content
/// to `visit`.
pub(crate) fn walk_files<F>(root: &Path, mut visit: F) -> Result<()>
where
    F: FnMut(&Path, &str) -> Result<()>,
{
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let text = std::fs::read_to_string(entry.path())?;
        visit(entry.path(), &text)?;
    }
    Ok(())
}

/// Decode a file body into a sequence of JSON values. Bodies starting with
/// `{` are treated as a stream of JSON documents; everything else as a
/// YAML document stream. The legacy toolchain HTML-escapes `<`, `>` and
/// `&` inside JSON strings, so those sequences are unescaped first.
pub(crate) fn documents_in(text: &str) -> Result<Vec<Value>> {
    let text = html_unescape(text);
    let mut docs = Vec::new();
    if text.trim_start().starts_with('{') {
        for doc in serde_json::Deserializer::from_str(&text).into_iter::<Value>() {
            docs.push(doc?);
        }
    } else {
        for doc in serde_yaml::Deserializer::from_str(&text) {
            let value = Value::deserialize(doc)?;
            if !value.is_null() {
                docs.push(value);
            }
        }
    }
    Ok(docs)
}

/// Classify one document by schema and append it to `cfg`. Documents with
/// no schema field are silently dropped.
pub(crate) fn accumulate(doc: Value, cfg: &mut DeclarativeConfig) -> Result<()> {
    let schema = doc
        .get("schema")
        .and_then(Value::as_str)
        .unwrap_or_default();
    match schema {
        SCHEMA_PACKAGE => cfg.packages.push(serde_json::from_value(doc)?),
        SCHEMA_BUNDLE => cfg.bundles.push(serde_json::from_value(doc)?),
        "" => {}
        _ => cfg.others.push(Meta::from_value(doc)),
    }
    Ok(())
}

/// Reverse the HTML escaping the legacy Go encoder applies inside JSON
/// string values.
pub(crate) fn html_unescape(text: &str) -> String {
    text.replace("\\u003c", "<")
        .replace("\\u003e", ">")
        .replace("\\u0026", "&")
}
