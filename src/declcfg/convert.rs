// src/declcfg/convert.rs

//! Bidirectional conversion between declarative configs and the model.
//!
//! Loading groups bundle documents by package, expands every `olm.channel`
//! property into a distinct per-channel model bundle, and validates the
//! result. Rendering back is deterministic: packages sorted by name,
//! bundles within a package by name, properties by (type, canonical value).

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::declcfg::{self, DeclarativeConfig, SCHEMA_BUNDLE, SCHEMA_PACKAGE};
use crate::error::{Error, Result};
use crate::model;
use crate::property::{self, Property};

/// Build a validated model from a declarative config.
pub fn convert_to_model(cfg: &DeclarativeConfig) -> Result<model::Model> {
    let mut m = model::Model::new();

    for p in &cfg.packages {
        if p.name.is_empty() {
            return Err(Error::validation("package", "name must be set"));
        }
        if m.packages.contains_key(&p.name) {
            return Err(Error::validation(
                format!("package {:?}", p.name),
                "duplicate package declaration",
            ));
        }
        let icon = match &p.icon {
            Some(icon) => Some(model::Icon {
                data: BASE64.decode(&icon.base64_data).map_err(|e| {
                    Error::validation(
                        format!("package {:?}", p.name),
                        format!("invalid icon data: {e}"),
                    )
                })?,
                media_type: icon.media_type.clone(),
            }),
            None => None,
        };
        let mut mpkg = model::Package::new(&p.name);
        mpkg.description = p.description.clone();
        mpkg.default_channel = p.default_channel.clone();
        mpkg.icon = icon;
        m.packages.insert(p.name.clone(), mpkg);
    }

    for b in &cfg.bundles {
        if b.package.is_empty() {
            return Err(Error::validation(
                format!("bundle {:?}", b.name),
                "package must be set",
            ));
        }
        if !m.packages.contains_key(&b.package) {
            return Err(Error::validation(
                format!("bundle {:?}", b.name),
                format!("unknown package {:?}", b.package),
            ));
        }
        let props = property::parse(&b.properties)?;
        if props.channels.is_empty() {
            return Err(Error::validation(
                format!("bundle {:?}", b.name),
                "must belong to at least one channel",
            ));
        }
        let (csv_json, objects) = extract_objects(b)?;
        let related_images: Vec<model::RelatedImage> = b
            .related_images
            .iter()
            .map(|ri| model::RelatedImage {
                name: ri.name.clone(),
                image: ri.image.clone(),
            })
            .collect();
        for ch in &props.channels {
            let bundle = model::bundle_from_parts(
                &b.name,
                &b.package,
                &ch.name,
                &b.image,
                &ch.replaces,
                b.properties.clone(),
                related_images.clone(),
                csv_json.clone(),
                objects.clone(),
            )?;
            m.add_bundle(bundle);
        }
    }

    m.validate()?;
    Ok(m)
}

/// Inline objects for a bundle: explicit `objects` win; otherwise decode
/// every inline `olm.bundle.object` property. The CSV is recognized among
/// the objects by its kind.
fn extract_objects(b: &declcfg::Bundle) -> Result<(Option<String>, Vec<String>)> {
    let mut objects = b.objects.clone();
    if objects.is_empty() {
        let props = property::parse(&b.properties)?;
        for obj in &props.bundle_objects {
            if obj.is_ref() {
                continue;
            }
            let data = obj.get_data(std::path::Path::new(""), std::path::Path::new(""))?;
            objects.push(String::from_utf8_lossy(&data).into_owned());
        }
    }
    let csv_json = if b.csv_json.is_empty() {
        objects
            .iter()
            .find(|o| {
                serde_json::from_str::<serde_json::Value>(o)
                    .ok()
                    .and_then(|v| v.get("kind").and_then(|k| k.as_str().map(String::from)))
                    .as_deref()
                    == Some("ClusterServiceVersion")
            })
            .cloned()
    } else {
        Some(b.csv_json.clone())
    };
    Ok((csv_json, objects))
}

/// Render a model into canonical flat form.
pub fn convert_from_model(m: &model::Model) -> DeclarativeConfig {
    let mut cfg = DeclarativeConfig::default();
    for pkg in m.packages.values() {
        cfg.packages.push(declcfg::Package {
            schema: SCHEMA_PACKAGE.to_string(),
            name: pkg.name.clone(),
            default_channel: pkg.default_channel.clone(),
            icon: pkg.icon.as_ref().map(|icon| declcfg::Icon {
                base64_data: BASE64.encode(&icon.data),
                media_type: icon.media_type.clone(),
            }),
            description: pkg.description.clone(),
        });

        // A bundle in several channels collapses back into one document
        // carrying one channel property per membership.
        let mut by_name: BTreeMap<&str, Vec<&model::Bundle>> = BTreeMap::new();
        for ch in pkg.channels.values() {
            for b in ch.bundles.values() {
                by_name.entry(b.name.as_str()).or_default().push(b);
            }
        }
        for occurrences in by_name.values() {
            let first = match occurrences.first() {
                Some(b) => *b,
                None => continue,
            };
            cfg.bundles.push(bundle_to_declcfg(first, occurrences));
        }
    }
    cfg
}

fn bundle_to_declcfg(first: &model::Bundle, occurrences: &[&model::Bundle]) -> declcfg::Bundle {
    let mut props: Vec<Property> = Vec::new();
    for occ in occurrences {
        props.push(property::channel(&occ.channel, &occ.replaces));
    }
    props.push(property::package(
        &first.package,
        &first.version.to_string(),
    ));
    for g in &first.props.gvks {
        props.push(property::gvk(&g.group, &g.version, &g.kind));
    }
    for g in &first.props.gvks_required {
        props.push(property::gvk_required(&g.group, &g.version, &g.kind));
    }
    for p in &first.props.packages_required {
        props.push(property::package_required(
            &p.package_name,
            &p.version_range,
        ));
    }
    for s in &first.skips {
        props.push(property::skips(s));
    }
    for r in &first.props.skip_ranges {
        props.push(property::skip_range(r));
    }
    for other in &first.props.others {
        props.push(other.clone());
    }
    for obj in &first.objects {
        props.push(property::bundle_object_data(obj.as_bytes()));
    }
    if first.objects.is_empty() {
        if let Some(csv) = &first.csv_json {
            props.push(property::bundle_object_data(csv.as_bytes()));
        }
    }
    let mut props = property::deduplicate(props);
    property::sort_canonical(&mut props);

    declcfg::Bundle {
        schema: SCHEMA_BUNDLE.to_string(),
        name: first.name.clone(),
        package: first.package.clone(),
        image: first.image.clone(),
        properties: props,
        related_images: first
            .related_images
            .iter()
            .map(|ri| declcfg::RelatedImage {
                name: ri.name.clone(),
                image: ri.image.clone(),
            })
            .collect(),
        csv_json: first.csv_json.clone().unwrap_or_default(),
        objects: first.objects.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_config() -> DeclarativeConfig {
        DeclarativeConfig {
            packages: vec![declcfg::Package {
                schema: SCHEMA_PACKAGE.to_string(),
                name: "foo".to_string(),
                default_channel: "beta".to_string(),
                ..Default::default()
            }],
            bundles: vec![
                declcfg::Bundle {
                    schema: SCHEMA_BUNDLE.to_string(),
                    name: "foo.v0.1.0".to_string(),
                    package: "foo".to_string(),
                    image: "reg/foo-bundle:v0.1.0".to_string(),
                    properties: vec![
                        property::channel("beta", ""),
                        property::package("foo", "0.1.0"),
                    ],
                    ..Default::default()
                },
                declcfg::Bundle {
                    schema: SCHEMA_BUNDLE.to_string(),
                    name: "foo.v0.2.0".to_string(),
                    package: "foo".to_string(),
                    image: "reg/foo-bundle:v0.2.0".to_string(),
                    properties: vec![
                        property::channel("beta", "foo.v0.1.0"),
                        property::package("foo", "0.2.0"),
                    ],
                    ..Default::default()
                },
            ],
            others: Vec::new(),
        }
    }

    #[test]
    fn test_convert_to_model_basic() {
        let m = convert_to_model(&simple_config()).unwrap();
        let pkg = &m.packages["foo"];
        assert_eq!(pkg.default_channel, "beta");
        let ch = &pkg.channels["beta"];
        assert_eq!(ch.bundles.len(), 2);
        assert_eq!(ch.bundles["foo.v0.2.0"].replaces, "foo.v0.1.0");
        assert_eq!(
            ch.bundles["foo.v0.2.0"].version,
            semver::Version::new(0, 2, 0)
        );
    }

    #[test]
    fn test_convert_multichannel_bundle_fans_out() {
        let mut cfg = simple_config();
        cfg.bundles[1]
            .properties
            .insert(0, property::channel("stable", ""));
        let m = convert_to_model(&cfg).unwrap();
        let pkg = &m.packages["foo"];
        assert!(pkg.channels["beta"].bundles.contains_key("foo.v0.2.0"));
        assert!(pkg.channels["stable"].bundles.contains_key("foo.v0.2.0"));
        assert_eq!(pkg.channels["stable"].bundles["foo.v0.2.0"].channel, "stable");
    }

    #[test]
    fn test_convert_unknown_package_is_error() {
        let mut cfg = simple_config();
        cfg.bundles[0].package = "bar".to_string();
        let err = convert_to_model(&cfg).unwrap_err();
        assert!(err.to_string().contains("unknown package"));
    }

    #[test]
    fn test_convert_bundle_without_channel_is_error() {
        let mut cfg = simple_config();
        cfg.bundles[0].properties = vec![property::package("foo", "0.1.0")];
        let err = convert_to_model(&cfg).unwrap_err();
        assert!(err.to_string().contains("at least one channel"));
    }

    #[test]
    fn test_convert_invalid_version_is_error() {
        let mut cfg = simple_config();
        cfg.bundles[0].properties = vec![
            property::channel("beta", ""),
            property::package("foo", "one-dot-oh"),
        ];
        assert!(convert_to_model(&cfg).is_err());
    }

    #[test]
    fn test_model_round_trip_is_canonical() {
        let m = convert_to_model(&simple_config()).unwrap();
        let out = convert_from_model(&m);
        // Converting the canonical output again must be a fixed point.
        let m2 = convert_to_model(&out).unwrap();
        let out2 = convert_from_model(&m2);
        assert_eq!(out, out2);
        assert_eq!(out.packages.len(), 1);
        assert_eq!(out.bundles.len(), 2);
        assert_eq!(out.bundles[0].name, "foo.v0.1.0");
        assert_eq!(out.bundles[1].name, "foo.v0.2.0");
    }

    #[test]
    fn test_from_model_fans_multichannel_back_in() {
        let mut cfg = simple_config();
        cfg.bundles[1]
            .properties
            .insert(0, property::channel("stable", ""));
        let m = convert_to_model(&cfg).unwrap();
        let out = convert_from_model(&m);
        assert_eq!(out.bundles.len(), 2);
        let b2 = out
            .bundles
            .iter()
            .find(|b| b.name == "foo.v0.2.0")
            .unwrap();
        let channel_props: Vec<&Property> = b2
            .properties
            .iter()
            .filter(|p| p.typ == property::TYPE_CHANNEL)
            .collect();
        assert_eq!(channel_props.len(), 2);
    }
}
