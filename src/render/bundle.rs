// src/render/bundle.rs

//! Single-bundle image parsing.
//!
//! A bundle image carries its manifests and metadata under a fixed layout:
//! `manifests/` holds the cluster service version and every other object,
//! `metadata/annotations.yaml` names the package and channels, and an
//! optional `metadata/dependencies.yaml` declares requirements. The whole
//! image becomes exactly one bundle record.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::declcfg::{self, DeclarativeConfig, SCHEMA_BUNDLE};
use crate::error::{Error, Result};
use crate::property::{self, Property};

const PACKAGE_ANNOTATION: &str = "operators.operatorframework.io.bundle.package.v1";
const CHANNELS_ANNOTATION: &str = "operators.operatorframework.io.bundle.channels.v1";
const SKIP_RANGE_ANNOTATION: &str = "olm.skipRange";
const CSV_KIND: &str = "ClusterServiceVersion";

#[derive(Debug, Deserialize)]
struct AnnotationsFile {
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct DependenciesFile {
    #[serde(default)]
    dependencies: Vec<DependencyEntry>,
}

#[derive(Debug, Deserialize)]
struct DependencyEntry {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    value: Value,
}

/// Parse an unpacked bundle image at `root` into a one-bundle config.
pub fn bundle_to_config(image_ref: &str, root: &Path) -> Result<DeclarativeConfig> {
    let annotations = read_annotations(image_ref, root)?;
    let package = annotations
        .get(PACKAGE_ANNOTATION)
        .cloned()
        .ok_or_else(|| Error::reference(image_ref, "bundle image has no package annotation"))?;
    let channels: Vec<String> = annotations
        .get(CHANNELS_ANNOTATION)
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let (objects, csv) = read_manifests(image_ref, root)?;
    let csv = csv.ok_or_else(|| {
        Error::reference(image_ref, "bundle image has no cluster service version manifest")
    })?;

    let name = csv
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::reference(image_ref, "cluster service version has no name"))?
        .to_string();
    let version = csv
        .pointer("/spec/version")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let replaces = csv
        .pointer("/spec/replaces")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut properties: Vec<Property> = Vec::new();
    for ch in &channels {
        properties.push(property::channel(ch, &replaces));
    }
    properties.push(property::package(&package, &version));
    for gvk in owned_gvks(&csv) {
        properties.push(gvk);
    }
    if let Some(skips) = csv.pointer("/spec/skips").and_then(Value::as_array) {
        for s in skips.iter().filter_map(Value::as_str) {
            properties.push(property::skips(s));
        }
    }
    if let Some(range) = csv
        .pointer("/metadata/annotations")
        .and_then(|a| a.get(SKIP_RANGE_ANNOTATION))
        .and_then(Value::as_str)
    {
        properties.push(property::skip_range(range));
    }
    properties.extend(read_dependencies(image_ref, root)?);

    let related_images = csv
        .pointer("/spec/relatedImages")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|e| declcfg::RelatedImage {
                    name: e
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    image: e
                        .get("image")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let csv_json = serde_json::to_string(&csv)?;
    debug!(bundle = %name, package = %package, "parsed bundle image");
    Ok(DeclarativeConfig {
        packages: Vec::new(),
        bundles: vec![declcfg::Bundle {
            schema: SCHEMA_BUNDLE.to_string(),
            name,
            package,
            image: image_ref.to_string(),
            properties: property::deduplicate(properties),
            related_images,
            csv_json,
            objects,
        }],
        others: Vec::new(),
    })
}

fn read_annotations(image_ref: &str, root: &Path) -> Result<BTreeMap<String, String>> {
    let path = root.join("metadata/annotations.yaml");
    let text = std::fs::read_to_string(&path).map_err(|e| {
        Error::reference(image_ref, format!("read {}: {e}", path.display()))
    })?;
    let file: AnnotationsFile = serde_yaml::from_str(&text)?;
    Ok(file.annotations)
}

/// Every manifest becomes a compact JSON object string. The cluster
/// service version, if present, is returned separately as well.
fn read_manifests(image_ref: &str, root: &Path) -> Result<(Vec<String>, Option<Value>)> {
    let dir = root.join("manifests");
    let mut entries: Vec<_> = std::fs::read_dir(&dir)
        .map_err(|e| Error::reference(image_ref, format!("read {}: {e}", dir.display())))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut objects = Vec::new();
    let mut csv: Option<Value> = None;
    for entry in entries {
        if !entry.file_type()?.is_file() {
            continue;
        }
        let text = std::fs::read_to_string(entry.path())?;
        let doc: Value = match serde_yaml::from_str::<Value>(&text) {
            Ok(doc) if doc.is_object() => doc,
            _ => {
                debug!(path = %entry.path().display(), "skipping non-object manifest");
                continue;
            }
        };
        if doc.get("kind").and_then(Value::as_str) == Some(CSV_KIND) {
            csv = Some(doc.clone());
        }
        objects.push(serde_json::to_string(&doc)?);
    }
    Ok((objects, csv))
}

/// Provided GVK properties from the CSV's owned custom resource
/// definitions. The group is everything after the first dot of the CRD
/// name.
fn owned_gvks(csv: &Value) -> Vec<Property> {
    let mut out = Vec::new();
    if let Some(owned) = csv
        .pointer("/spec/customresourcedefinitions/owned")
        .and_then(Value::as_array)
    {
        for crd in owned {
            let name = crd.get("name").and_then(Value::as_str).unwrap_or_default();
            let group = name.split_once('.').map(|(_, g)| g).unwrap_or_default();
            let version = crd
                .get("version")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let kind = crd.get("kind").and_then(Value::as_str).unwrap_or_default();
            out.push(property::gvk(group, version, kind));
        }
    }
    out.sort_by_key(|p| p.canonical_value());
    out
}

/// Requirement properties from `metadata/dependencies.yaml`, when present.
fn read_dependencies(image_ref: &str, root: &Path) -> Result<Vec<Property>> {
    let path = root.join("metadata/dependencies.yaml");
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(&path)?;
    let file: DependenciesFile = serde_yaml::from_str(&text)?;
    let mut out = Vec::new();
    for dep in file.dependencies {
        match dep.typ.as_str() {
            "olm.package" => {
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
            "olm.gvk" => {
                let group = dep
                    .value
                    .get("group")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let version = dep
                    .value
                    .get("version")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let kind = dep
                    .value
                    .get("kind")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                out.push(property::gvk_required(group, version, kind));
            }
            other => {
                return Err(Error::reference(
                    image_ref,
                    format!("unknown dependency type {other:?}"),
                ));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = r#"
apiVersion: operators.coreos.com/v1alpha1
kind: ClusterServiceVersion
metadata:
  name: foo.v0.2.0
  annotations:
    olm.skipRange: "<0.2.0"
spec:
  version: 0.2.0
  replaces: foo.v0.1.0
  skips:
  - foo.v0.1.1
  customresourcedefinitions:
    owned:
    - name: foos.test.foo
      version: v1
      kind: Foo
  relatedImages:
  - name: operator
    image: reg/foo:v0.2.0
"#;

    const CRD: &str = r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: foos.test.foo
"#;

    const ANNOTATIONS: &str = r#"
annotations:
  operators.operatorframework.io.bundle.package.v1: foo
  operators.operatorframework.io.bundle.channels.v1: beta
  operators.operatorframework.io.bundle.channel.default.v1: beta
"#;

    const DEPENDENCIES: &str = r#"
dependencies:
- type: olm.gvk
  value:
    group: test.bar
    version: v1alpha1
    kind: Bar
- type: olm.package
  value:
    packageName: bar
    version: "<0.1.0"
"#;

    fn write_bundle_image(dir: &Path) {
        std::fs::create_dir_all(dir.join("manifests")).unwrap();
        std::fs::create_dir_all(dir.join("metadata")).unwrap();
        std::fs::write(dir.join("manifests/foo.v0.2.0.csv.yaml"), CSV).unwrap();
        std::fs::write(dir.join("manifests/foos.test.foo.crd.yaml"), CRD).unwrap();
        std::fs::write(dir.join("metadata/annotations.yaml"), ANNOTATIONS).unwrap();
        std::fs::write(dir.join("metadata/dependencies.yaml"), DEPENDENCIES).unwrap();
    }

    #[test]
    fn test_bundle_to_config() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle_image(dir.path());
        let cfg = bundle_to_config("reg/foo-bundle:v0.2.0", dir.path()).unwrap();

        assert!(cfg.packages.is_empty());
        assert_eq!(cfg.bundles.len(), 1);
        let b = &cfg.bundles[0];
        assert_eq!(b.name, "foo.v0.2.0");
        assert_eq!(b.package, "foo");
        assert_eq!(b.image, "reg/foo-bundle:v0.2.0");
        assert_eq!(b.objects.len(), 2);
        assert!(b.csv_json.contains("ClusterServiceVersion"));

        let expected = [
            property::channel("beta", "foo.v0.1.0"),
            property::package("foo", "0.2.0"),
            property::gvk("test.foo", "v1", "Foo"),
            property::skips("foo.v0.1.1"),
            property::skip_range("<0.2.0"),
            property::gvk_required("test.bar", "v1alpha1", "Bar"),
            property::package_required("bar", "<0.1.0"),
        ];
        for p in &expected {
            assert!(
                b.properties.contains(p),
                "missing property {:?} {:?}",
                p.typ,
                p.value
            );
        }
        assert_eq!(b.related_images.len(), 1);
        assert_eq!(b.related_images[0].image, "reg/foo:v0.2.0");
    }

    #[test]
    fn test_bundle_without_csv_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("manifests")).unwrap();
        std::fs::create_dir_all(dir.path().join("metadata")).unwrap();
        std::fs::write(dir.path().join("metadata/annotations.yaml"), ANNOTATIONS).unwrap();
        std::fs::write(dir.path().join("manifests/crd.yaml"), CRD).unwrap();
        let err = bundle_to_config("reg/foo-bundle:v0.2.0", dir.path()).unwrap_err();
        assert!(err.to_string().contains("cluster service version"));
    }
}
