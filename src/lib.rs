// src/lib.rs

//! opcat - operator catalog engine
//!
//! Renders heterogeneous catalog references (declarative-config trees,
//! legacy indexed databases, container images) into a unified in-memory
//! model and computes content-level diffs and prunes over it.
//!
//! # Architecture
//!
//! - Model-first: packages own channels own bundles, back-references by name
//! - Declarative config: the flat YAML/JSON wire form, deterministic output
//! - Package index: per-package disk spill so catalogs outgrow memory
//! - Diff/prune: selection -> dependency resolver -> replaces scrub
//! - External collaborators behind traits: image registry, indexed database

pub mod cancel;
pub mod declcfg;
mod error;
pub mod image;
pub mod model;
pub mod property;
pub mod render;
pub mod sqlite;

pub use cancel::CancelToken;
pub use declcfg::diff::{DiffConfig, DiffOptions};
pub use declcfg::index::PackageIndex;
pub use declcfg::prune::{PruneConfig, PruneOptions};
pub use declcfg::DeclarativeConfig;
pub use error::{Error, KeyKind, Result};
pub use image::{ImageRegistry, MockRegistry};
pub use model::Model;
pub use render::Render;
pub use sqlite::{Query, SqliteQuerier};
