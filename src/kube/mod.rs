//! Kind-agnostic manifest application.
//!
//! A manifest stream is decoded lazily into [`DecodedResource`]s, each one is
//! resolved against a discovery snapshot fetched for this apply, and applied
//! server-side in document order. The first failure stops the run; resources
//! applied before it stay applied.
use serde_json::{Map, Value};

mod apply;
mod client;
mod connection;
mod decode;
mod discovery;

pub use apply::{apply_manifest, AppliedResource, ApplyError, ApplySummary, Applier, FIELD_MANAGER};
pub use client::{ClusterClient, ClusterError, HttpClusterClient};
pub use connection::{resolve_connection, ClusterConnection};
pub use decode::{decode_documents, DecodeError, Documents};
pub use discovery::{
    ApiGroupResources, ApiResource, DiscoverySnapshot, ResourceMapping, Scope, UnknownResource,
};

/// Declared type of a manifest document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersionKind {
    /// Empty for the core group.
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    /// Split an `apiVersion` value (`v1`, `apps/v1`) and pair it with `kind`.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl std::fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// One document from a manifest stream.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResource {
    /// Zero-based position in the stream.
    pub index: usize,
    pub gvk: GroupVersionKind,
    pub object: Map<String, Value>,
}

impl DecodedResource {
    fn metadata_str(&self, field: &str) -> Option<&str> {
        self.object
            .get("metadata")?
            .get(field)?
            .as_str()
            .filter(|value| !value.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata_str("name")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata_str("namespace")
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        let mut metadata = match self.object.remove("metadata") {
            Some(Value::Object(metadata)) => metadata,
            _ => Map::new(),
        };
        metadata.insert("namespace".to_string(), Value::String(namespace.to_string()));
        self.object
            .insert("metadata".to_string(), Value::Object(metadata));
    }

    pub fn clear_namespace(&mut self) {
        if let Some(Value::Object(metadata)) = self.object.get_mut("metadata") {
            metadata.remove("namespace");
        }
    }
}
