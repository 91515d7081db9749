// tests/common/mod.rs

//! Shared fixtures for integration tests.
//!
//! The fixture catalogs mirror a realistic upgrade history: the old
//! catalog holds the start of foo's replaces chain, the new catalog
//! extends it with a skipped branch and a dependency on bar.

#![allow(dead_code)]

use std::path::Path;

use opcat::declcfg::write::write_yaml;
use opcat::declcfg::{self, DeclarativeConfig, SCHEMA_BUNDLE, SCHEMA_PACKAGE};
use opcat::property::{self, Property};

pub fn package_record(name: &str, default_channel: &str) -> declcfg::Package {
    declcfg::Package {
        schema: SCHEMA_PACKAGE.to_string(),
        name: name.to_string(),
        default_channel: default_channel.to_string(),
        ..Default::default()
    }
}

pub fn bundle_record(
    pkg: &str,
    name: &str,
    ch: &str,
    version: &str,
    replaces: &str,
    extra: Vec<Property>,
) -> declcfg::Bundle {
    let mut properties = vec![
        property::channel(ch, replaces),
        property::package(pkg, version),
    ];
    properties.extend(extra);
    declcfg::Bundle {
        schema: SCHEMA_BUNDLE.to_string(),
        name: name.to_string(),
        package: pkg.to_string(),
        image: format!("test.registry/{pkg}-operator/{pkg}-bundle:v{version}"),
        properties,
        ..Default::default()
    }
}

/// Write `cfg` as a single catalog file under `dir`.
pub fn write_catalog(dir: &Path, cfg: &DeclarativeConfig) {
    let mut buf = Vec::new();
    write_yaml(cfg, &mut buf).unwrap();
    std::fs::write(dir.join("catalog.yaml"), buf).unwrap();
}

/// The consumer's catalog: foo up to v0.0.3.
pub fn old_catalog() -> DeclarativeConfig {
    DeclarativeConfig {
        packages: vec![package_record("foo", "stable")],
        bundles: vec![
            bundle_record("foo", "foo.v0.0.1", "stable", "0.0.1", "", Vec::new()),
            bundle_record("foo", "foo.v0.0.2", "stable", "0.0.2", "foo.v0.0.1", Vec::new()),
            bundle_record("foo", "foo.v0.0.3", "stable", "0.0.3", "foo.v0.0.2", Vec::new()),
        ],
        others: Vec::new(),
    }
}

/// The upstream catalog: foo's chain extended through a skipped branch up
/// to v0.3.0 (which requires bar's API), plus bar at two versions.
pub fn new_catalog() -> DeclarativeConfig {
    DeclarativeConfig {
        packages: vec![
            package_record("foo", "stable"),
            package_record("bar", "stable"),
        ],
        bundles: vec![
            bundle_record("foo", "foo.v0.0.1", "stable", "0.0.1", "", Vec::new()),
            bundle_record("foo", "foo.v0.0.2", "stable", "0.0.2", "foo.v0.0.1", Vec::new()),
            bundle_record("foo", "foo.v0.0.3", "stable", "0.0.3", "foo.v0.0.2", Vec::new()),
            bundle_record("foo", "foo.v0.1.0", "stable", "0.1.0", "foo.v0.0.3", Vec::new()),
            bundle_record("foo", "foo.v0.1.1", "stable", "0.1.1", "foo.v0.1.0", Vec::new()),
            {
                let mut b = bundle_record(
                    "foo",
                    "foo.v0.2.0",
                    "stable",
                    "0.2.0",
                    "foo.v0.1.0",
                    vec![property::skips("foo.v0.1.1")],
                );
                b.properties.push(property::skip_range("<0.2.0"));
                b
            },
            bundle_record(
                "foo",
                "foo.v0.3.0",
                "stable",
                "0.3.0",
                "foo.v0.2.0",
                vec![property::gvk_required("test.bar", "v1alpha1", "Bar")],
            ),
            bundle_record(
                "bar",
                "bar.v0.1.0",
                "stable",
                "0.1.0",
                "",
                vec![property::gvk("test.bar", "v1alpha1", "Bar")],
            ),
            bundle_record(
                "bar",
                "bar.v0.2.0",
                "stable",
                "0.2.0",
                "bar.v0.1.0",
                vec![property::gvk("test.bar", "v1alpha1", "Bar")],
            ),
        ],
        others: Vec::new(),
    }
}

/// Names of the bundles in one channel of a rendered config's model.
pub fn channel_bundle_names(m: &opcat::Model, pkg: &str, ch: &str) -> Vec<String> {
    m.packages[pkg].channels[ch]
        .bundles
        .keys()
        .cloned()
        .collect()
}
