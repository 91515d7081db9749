// tests/prune_integration.rs

//! End-to-end prune flows over a rendered catalog index.

mod common;

use common::{channel_bundle_names, new_catalog, write_catalog};
use opcat::declcfg::prune::{PruneChannel, PrunePackage, prune_index};
use opcat::{CancelToken, PackageIndex, PruneConfig, PruneOptions, Render};

fn indexed_catalog() -> (tempfile::TempDir, PackageIndex) {
    let dir = tempfile::tempdir().unwrap();
    write_catalog(dir.path(), &new_catalog());
    let mut idx = PackageIndex::new();
    Render::new(vec![dir.path().display().to_string()])
        .index_into(&mut idx)
        .unwrap();
    (dir, idx)
}

fn keep_config(bundles: &[&str]) -> PruneConfig {
    PruneConfig {
        packages: vec![PrunePackage {
            name: "foo".to_string(),
            channels: vec![PruneChannel {
                name: "stable".to_string(),
                bundles: bundles.iter().map(|s| s.to_string()).collect(),
            }],
        }],
    }
}

#[test]
fn test_prune_keep_with_heads_keeps_selection_and_heads() {
    let (_dir, mut idx) = indexed_catalog();
    let opts = PruneOptions {
        keep: true,
        heads: true,
        ..Default::default()
    };
    let out = prune_index(&idx, &keep_config(&["foo.v0.1.0"]), opts, &CancelToken::new()).unwrap();

    // The kept bundle plus the channel head of every package.
    assert_eq!(
        channel_bundle_names(&out, "foo", "stable"),
        vec!["foo.v0.1.0", "foo.v0.3.0"]
    );
    assert_eq!(
        channel_bundle_names(&out, "bar", "stable"),
        vec!["bar.v0.2.0"]
    );

    // foo.v0.1.0 replaced a bundle that is gone; the pointer is scrubbed.
    let foo_ch = &out.packages["foo"].channels["stable"];
    assert!(foo_ch.bundles["foo.v0.1.0"].replaces.is_empty());
    idx.cleanup().unwrap();
}

#[test]
fn test_prune_keep_without_heads_closes_dependencies() {
    let (_dir, mut idx) = indexed_catalog();
    let opts = PruneOptions {
        keep: true,
        ..Default::default()
    };
    let out = prune_index(&idx, &keep_config(&["foo.v0.3.0"]), opts, &CancelToken::new()).unwrap();

    assert_eq!(
        channel_bundle_names(&out, "foo", "stable"),
        vec!["foo.v0.3.0"]
    );
    // The kept bundle requires bar's API; the highest provider is pulled
    // in even though bar was never named.
    assert_eq!(
        channel_bundle_names(&out, "bar", "stable"),
        vec!["bar.v0.2.0"]
    );
    idx.cleanup().unwrap();
}

#[test]
fn test_prune_remove_readds_needed_provider() {
    let (_dir, mut idx) = indexed_catalog();
    let cfg = PruneConfig {
        packages: vec![PrunePackage {
            name: "bar".to_string(),
            channels: Vec::new(),
        }],
    };
    let out = prune_index(&idx, &cfg, PruneOptions::default(), &CancelToken::new()).unwrap();

    // foo survives whole; bar was removed but foo.v0.3.0 still requires
    // its API, so the resolver restores the highest provider.
    assert_eq!(out.packages["foo"].channels["stable"].bundles.len(), 7);
    assert_eq!(
        channel_bundle_names(&out, "bar", "stable"),
        vec!["bar.v0.2.0"]
    );
    idx.cleanup().unwrap();
}

#[test]
fn test_prune_keep_whole_package() {
    let (_dir, mut idx) = indexed_catalog();
    let cfg = PruneConfig {
        packages: vec![PrunePackage {
            name: "bar".to_string(),
            channels: Vec::new(),
        }],
    };
    let opts = PruneOptions {
        keep: true,
        ..Default::default()
    };
    let out = prune_index(&idx, &cfg, opts, &CancelToken::new()).unwrap();
    assert!(!out.packages.contains_key("foo"));
    assert_eq!(
        channel_bundle_names(&out, "bar", "stable"),
        vec!["bar.v0.1.0", "bar.v0.2.0"]
    );
    idx.cleanup().unwrap();
}
