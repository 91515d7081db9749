// src/declcfg/write.rs

//! Canonical serialization of declarative configs.
//!
//! Documents are grouped by package and ordered by name: each package
//! record, then its bundles, then its schema-unknown objects, then global
//! objects. Running the same write twice over the same config produces
//! byte-identical output.

use std::collections::BTreeSet;
use std::io::Write;

use serde::Serialize;

use crate::declcfg::{self, DeclarativeConfig, Meta};
use crate::error::Result;

#[derive(Serialize)]
#[serde(untagged)]
enum Record<'a> {
    Package(&'a declcfg::Package),
    Bundle(&'a declcfg::Bundle),
    Meta(&'a Meta),
}

/// Write `cfg` as a YAML document stream, each document preceded by `---`.
pub fn write_yaml<W: Write>(cfg: &DeclarativeConfig, w: &mut W) -> Result<()> {
    for record in ordered_records(cfg) {
        w.write_all(b"---\n")?;
        let text = serde_yaml::to_string(&record)?;
        w.write_all(text.as_bytes())?;
    }
    Ok(())
}

/// Write `cfg` as a stream of pretty-printed JSON documents.
pub fn write_json<W: Write>(cfg: &DeclarativeConfig, w: &mut W) -> Result<()> {
    for record in ordered_records(cfg) {
        serde_json::to_writer_pretty(&mut *w, &record)?;
        w.write_all(b"\n")?;
    }
    Ok(())
}

/// The canonical document order: packages by name, each followed by its
/// bundles sorted by name and its objects sorted by schema, then global
/// objects.
fn ordered_records(cfg: &DeclarativeConfig) -> Vec<Record<'_>> {
    let mut pkg_names: BTreeSet<&str> = BTreeSet::new();
    for p in &cfg.packages {
        pkg_names.insert(&p.name);
    }
    for b in &cfg.bundles {
        pkg_names.insert(&b.package);
    }
    for o in &cfg.others {
        if !o.package.is_empty() {
            pkg_names.insert(&o.package);
        }
    }

    let mut records = Vec::new();
    for pkg_name in pkg_names {
        for p in cfg.packages.iter().filter(|p| p.name == pkg_name) {
            records.push(Record::Package(p));
        }
        let mut bundles: Vec<&declcfg::Bundle> = cfg
            .bundles
            .iter()
            .filter(|b| b.package == pkg_name)
            .collect();
        bundles.sort_by(|a, b| a.name.cmp(&b.name));
        records.extend(bundles.into_iter().map(Record::Bundle));

        let mut others: Vec<&Meta> = cfg
            .others
            .iter()
            .filter(|o| o.package == pkg_name)
            .collect();
        others.sort_by(|a, b| a.schema.cmp(&b.schema));
        records.extend(others.into_iter().map(Record::Meta));
    }
    let mut globals: Vec<&Meta> = cfg.others.iter().filter(|o| o.package.is_empty()).collect();
    globals.sort_by(|a, b| a.schema.cmp(&b.schema));
    records.extend(globals.into_iter().map(Record::Meta));
    records
}
