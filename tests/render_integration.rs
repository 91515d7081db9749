// tests/render_integration.rs

//! End-to-end render flows: config directories and mock container images.

mod common;

use std::path::Path;

use common::{new_catalog, write_catalog};
use opcat::declcfg::convert::convert_to_model;
use opcat::declcfg::write::write_yaml;
use opcat::image::{CONFIGS_LABEL, PACKAGE_LABEL};
use opcat::property;
use opcat::{MockRegistry, Render};

const CSV: &str = r#"
apiVersion: operators.coreos.com/v1alpha1
kind: ClusterServiceVersion
metadata:
  name: baz.v0.1.0
spec:
  version: 0.1.0
  customresourcedefinitions:
    owned:
    - name: bazzes.test.baz
      version: v1
      kind: Baz
  relatedImages:
  - name: operator
    image: test.registry/baz-operator/baz:v0.1.0
"#;

const ANNOTATIONS: &str = r#"
annotations:
  operators.operatorframework.io.bundle.package.v1: baz
  operators.operatorframework.io.bundle.channels.v1: stable
  operators.operatorframework.io.bundle.channel.default.v1: stable
"#;

fn write_bundle_image(dir: &Path) {
    std::fs::create_dir_all(dir.join("manifests")).unwrap();
    std::fs::create_dir_all(dir.join("metadata")).unwrap();
    std::fs::write(dir.join("manifests/baz.v0.1.0.csv.yaml"), CSV).unwrap();
    std::fs::write(dir.join("metadata/annotations.yaml"), ANNOTATIONS).unwrap();
}

#[test]
fn test_render_directory_reference() {
    let dir = tempfile::tempdir().unwrap();
    write_catalog(dir.path(), &new_catalog());
    let cfg = Render::new(vec![dir.path().display().to_string()])
        .run()
        .unwrap();
    assert_eq!(cfg.packages.len(), 2);
    assert_eq!(cfg.bundles.len(), 9);
    // Output comes back in per-package canonical order: bar before foo.
    assert_eq!(cfg.packages[0].name, "bar");
    assert_eq!(cfg.bundles[0].package, "bar");
    convert_to_model(&cfg).unwrap().validate().unwrap();
}

#[test]
fn test_render_configs_image_and_bundle_image() {
    let configs_root = tempfile::tempdir().unwrap();
    let tree = configs_root.path().join("configs");
    std::fs::create_dir_all(&tree).unwrap();
    write_catalog(&tree, &new_catalog());

    let bundle_root = tempfile::tempdir().unwrap();
    write_bundle_image(bundle_root.path());

    let reg = MockRegistry::new()
        .with_image(
            "test.registry/index:v1",
            &[(CONFIGS_LABEL, "/configs")],
            configs_root.path(),
        )
        .with_image(
            "test.registry/baz-operator/baz-bundle:v0.1.0",
            &[(PACKAGE_LABEL, "baz")],
            bundle_root.path(),
        );

    let cfg = Render::new(vec![
        "test.registry/index:v1".to_string(),
        "test.registry/baz-operator/baz-bundle:v0.1.0".to_string(),
    ])
    .with_registry(&reg)
    .run()
    .unwrap();

    assert_eq!(cfg.packages.len(), 2);
    assert_eq!(cfg.bundles.len(), 10);
    let baz = cfg.bundles.iter().find(|b| b.package == "baz").unwrap();
    assert_eq!(baz.name, "baz.v0.1.0");
    assert_eq!(baz.image, "test.registry/baz-operator/baz-bundle:v0.1.0");
    assert!(baz
        .properties
        .contains(&property::gvk("test.baz", "v1", "Baz")));
    // The CSV became an inline bundle object property.
    assert!(baz
        .properties
        .iter()
        .any(|p| p.typ == property::TYPE_BUNDLE_OBJECT));
    assert_eq!(baz.related_images.len(), 1);
}

#[test]
fn test_render_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    write_catalog(dir.path(), &new_catalog());
    let render_once = || {
        let cfg = Render::new(vec![dir.path().display().to_string()])
            .run()
            .unwrap();
        let mut buf = Vec::new();
        write_yaml(&cfg, &mut buf).unwrap();
        buf
    };
    assert_eq!(render_once(), render_once());
}

#[test]
fn test_render_unclassifiable_image_fails_with_labels() {
    let dir = tempfile::tempdir().unwrap();
    let reg = MockRegistry::new().with_image(
        "test.registry/mystery:v1",
        &[("a.label", "1"), ("b.label", "2")],
        dir.path(),
    );
    let err = Render::new(vec!["test.registry/mystery:v1".to_string()])
        .with_registry(&reg)
        .run()
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("a.label=1"));
    assert!(msg.contains("b.label=2"));
}
