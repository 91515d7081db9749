// tests/diff_integration.rs

//! End-to-end diff flows: render both sides from disk, describe the old
//! side, and diff against the indexed new side.

mod common;

use common::{channel_bundle_names, new_catalog, old_catalog, write_catalog};
use opcat::declcfg::convert::convert_from_model;
use opcat::declcfg::diff::{convert_to_diff_config, diff_index};
use opcat::declcfg::write::write_yaml;
use opcat::{CancelToken, DiffOptions, PackageIndex, Render};

fn indexed_new_catalog() -> (tempfile::TempDir, PackageIndex) {
    let new_dir = tempfile::tempdir().unwrap();
    write_catalog(new_dir.path(), &new_catalog());
    let mut idx = PackageIndex::new();
    Render::new(vec![new_dir.path().display().to_string()])
        .index_into(&mut idx)
        .unwrap();
    (new_dir, idx)
}

fn old_diff_config() -> opcat::DiffConfig {
    let old_dir = tempfile::tempdir().unwrap();
    write_catalog(old_dir.path(), &old_catalog());
    let old_cfg = Render::new(vec![old_dir.path().display().to_string()])
        .run()
        .unwrap();
    convert_to_diff_config(&old_cfg).unwrap()
}

#[test]
fn test_fill_diff_ships_upgrade_graph_and_dependencies() {
    let (_new_dir, mut idx) = indexed_new_catalog();
    let diff_cfg = old_diff_config();

    let opts = DiffOptions {
        fill: true,
        deps: true,
        ..Default::default()
    };
    let out = diff_index(&idx, &diff_cfg, opts, &CancelToken::new()).unwrap();

    // Everything reachable from the old head v0.0.3, including the bundle
    // skipped by v0.2.0 but still on the replacers map.
    assert_eq!(
        channel_bundle_names(&out, "foo", "stable"),
        vec!["foo.v0.1.0", "foo.v0.1.1", "foo.v0.2.0", "foo.v0.3.0"]
    );
    // foo.v0.3.0 requires bar's API; the highest provider comes along.
    assert_eq!(
        channel_bundle_names(&out, "bar", "stable"),
        vec!["bar.v0.2.0"]
    );

    // No bundle points at something outside the output.
    for pkg in out.packages.values() {
        for ch in pkg.channels.values() {
            for b in ch.bundles.values() {
                assert!(
                    b.replaces.is_empty() || ch.bundles.contains_key(&b.replaces),
                    "dangling replaces {:?} on {:?}",
                    b.replaces,
                    b.name
                );
            }
        }
    }
    idx.cleanup().unwrap();
}

#[test]
fn test_fill_diff_same_catalog_is_empty() {
    let (_new_dir, mut idx) = indexed_new_catalog();

    let new_dir = tempfile::tempdir().unwrap();
    write_catalog(new_dir.path(), &new_catalog());
    let same_cfg = Render::new(vec![new_dir.path().display().to_string()])
        .run()
        .unwrap();
    let diff_cfg = convert_to_diff_config(&same_cfg).unwrap();

    let opts = DiffOptions {
        fill: true,
        ..Default::default()
    };
    let out = diff_index(&idx, &diff_cfg, opts, &CancelToken::new()).unwrap();
    assert_eq!(out.bundle_count(), 0);
    idx.cleanup().unwrap();
}

#[test]
fn test_diff_output_is_byte_identical_across_runs() {
    let run = || {
        let (_new_dir, mut idx) = indexed_new_catalog();
        let diff_cfg = old_diff_config();
        let opts = DiffOptions {
            fill: true,
            deps: true,
            ..Default::default()
        };
        let out = diff_index(&idx, &diff_cfg, opts, &CancelToken::new()).unwrap();
        let cfg = convert_from_model(&out);
        let mut buf = Vec::new();
        write_yaml(&cfg, &mut buf).unwrap();
        idx.cleanup().unwrap();
        buf
    };
    assert_eq!(run(), run());
}

#[test]
fn test_diff_of_empty_references_is_empty_config() {
    let empty_old = tempfile::tempdir().unwrap();
    let empty_new = tempfile::tempdir().unwrap();

    let mut idx = PackageIndex::new();
    Render::new(vec![empty_new.path().display().to_string()])
        .index_into(&mut idx)
        .unwrap();
    let old_cfg = Render::new(vec![empty_old.path().display().to_string()])
        .run()
        .unwrap();
    let diff_cfg = convert_to_diff_config(&old_cfg).unwrap();

    let out = diff_index(
        &idx,
        &diff_cfg,
        DiffOptions {
            fill: true,
            ..Default::default()
        },
        &CancelToken::new(),
    )
    .unwrap();
    let cfg = convert_from_model(&out);
    assert!(cfg.is_empty());
    idx.cleanup().unwrap();
}

#[test]
fn test_heads_flag_carries_new_only_packages() {
    let (_new_dir, mut idx) = indexed_new_catalog();
    let diff_cfg = old_diff_config();

    // The old catalog knows nothing of bar; with heads on, bar's channel
    // head rides along.
    let opts = DiffOptions {
        fill: true,
        heads: true,
        ..Default::default()
    };
    let out = diff_index(&idx, &diff_cfg, opts, &CancelToken::new()).unwrap();
    assert_eq!(
        channel_bundle_names(&out, "bar", "stable"),
        vec!["bar.v0.2.0"]
    );
    idx.cleanup().unwrap();
}
