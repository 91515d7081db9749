// src/error.rs

//! Central error type for the opcat library.
//!
//! Every fallible library operation returns [`Result`]. The variants mirror
//! the failure surfaces of the engine: property parsing, model validation,
//! diff/prune config keys, dependency resolution, index-cache integrity,
//! and reference classification. I/O and codec errors pass through.

use thiserror::Error;

use crate::property::Gvk;

/// The kind of catalog entity a diff/prune config key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Package,
    Channel,
    Bundle,
}

impl KeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Package => "package",
            KeyKind::Channel => "channel",
            KeyKind::Bundle => "bundle",
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// A bundle property value failed to parse as its declared type.
    #[error("property at index {index} of type {typ:?}: {source}")]
    Property {
        index: usize,
        typ: String,
        #[source]
        source: serde_json::Error,
    },

    /// A model invariant was violated.
    #[error("invalid {scope}: {detail}")]
    Validation { scope: String, detail: String },

    /// A diff/prune config names an entity absent from the catalog.
    /// Recoverable under permissive mode.
    #[error("{kind} key {key:?} not found in catalog")]
    MissingKey { kind: KeyKind, key: String },

    /// The resolver could not locate providers for every requirement.
    #[error("dependencies not provided: gvks {gvks:?}, packages {packages:?}")]
    DependencyUnsatisfied { gvks: Vec<Gvk>, packages: Vec<String> },

    /// A per-package cache file holds records for a different package.
    #[error("{0}; index cache files may have been modified")]
    IndexTampered(String),

    /// A catalog reference could not be classified or retrieved.
    #[error("reference {reference:?}: {detail}")]
    Reference { reference: String, detail: String },

    /// The caller's deadline expired or the operation was canceled.
    #[error("operation canceled")]
    Canceled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("version error: {0}")]
    Semver(#[from] semver::Error),
}

impl Error {
    /// Shorthand for a [`Error::Validation`] with formatted scope/detail.
    pub fn validation(scope: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Validation {
            scope: scope.into(),
            detail: detail.into(),
        }
    }

    /// Shorthand for a [`Error::Reference`].
    pub fn reference(reference: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Reference {
            reference: reference.into(),
            detail: detail.into(),
        }
    }
}

/// Result type for all library operations.
pub type Result<T> = std::result::Result<T, Error>;
