//! Rewind core types: resource identities, the restore index, and the
//! error taxonomy shared across the loader crates.

#![forbid(unsafe_code)]

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Group + version + plural resource name, as encoded in archive entry paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

/// Version-independent key used to look up decryption transforms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupResource {
    pub group: String,
    pub resource: String,
}

impl GroupVersionResource {
    /// Parse an archive resource-type token.
    ///
    /// Tokens look like `serviceaccounts.#v1` (core group) or
    /// `users.management.cattle.io#v3`: the version follows `#`, and the
    /// part before it is `<resource>.` or `<resource>.<group>`.
    pub fn parse_token(token: &str) -> Self {
        let (front, version) = match token.split_once('#') {
            Some((f, v)) => (f, v),
            None => (token, ""),
        };
        let (resource, group) = match front.split_once('.') {
            Some((r, g)) => (r, g),
            None => (front, ""),
        };
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }

    pub fn group_resource(&self) -> GroupResource {
        GroupResource { group: self.group.clone(), resource: self.resource.clone() }
    }

    /// CRDs get their own index partition so they can be applied first.
    pub fn is_crd(&self) -> bool {
        self.resource.eq_ignore_ascii_case("customresourcedefinitions")
    }
}

impl std::fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.resource)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}

/// Identity of one resource record inside a backup archive.
///
/// `namespace` is `Some` iff the archive path carried a namespace segment;
/// `source_path` is the full entry path, unique per archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub name: String,
    pub gvr: GroupVersionResource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub source_path: String,
}

/// A schema-less Kubernetes manifest after optional decryption.
pub type DecodedResource = serde_json::Map<String, serde_json::Value>;

/// In-memory index built from one backup archive, partitioned for the
/// apply phase (CRDs first, then cluster-scoped, then namespaced).
/// Created empty per restore attempt; never mutated after the archive
/// stream is fully consumed.
#[derive(Debug, Default)]
pub struct RestoreIndex {
    pub cluster_scoped: FxHashMap<ResourceIdentity, DecodedResource>,
    pub namespaced: FxHashMap<ResourceIdentity, DecodedResource>,
    pub custom_resource_definitions: FxHashMap<ResourceIdentity, DecodedResource>,
    /// Every resource entry path observed, marked before decode so
    /// partially-failed entries stay visible for audit.
    pub seen_paths: FxHashSet<String>,
    /// Backup filter-set descriptor from `filters.json`. Its shape is owned
    /// by the backup side; kept opaque here.
    pub backup_resource_set: serde_json::Value,
    /// Resource types known to carry a status sub-resource, from
    /// `statussubresource.json`.
    pub resources_with_status_subresource: FxHashMap<String, bool>,
}

impl RestoreIndex {
    pub fn len(&self) -> usize {
        self.cluster_scoped.len() + self.namespaced.len() + self.custom_resource_definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the archive load pipeline. Every failure aborts the
/// whole load; there is no partial-success mode.
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("configuration: {0}")]
    Configuration(String),
    #[error("retrieving {key}: {source}")]
    Retrieval {
        key: String,
        #[source]
        source: BoxError,
    },
    #[error("opening archive {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("corrupt archive stream at {path}: {source}")]
    Format {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed entry path {path:?}: expected <type>/<name>.json or <type>/<ns>/<name>.json")]
    MalformedEntry { path: String },
    #[error("decoding ciphertext envelope for {path}: {reason}")]
    Envelope { path: String, reason: String },
    #[error("decrypting {path}: {reason}")]
    Decryption { path: String, reason: String },
    #[error("decoding JSON body of {path}: {source}")]
    JsonDecode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate archive path {path}")]
    Duplicate { path: String },
}
