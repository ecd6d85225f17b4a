//! Strict-order, fail-fast server-side apply.
use super::client::{ClusterClient, ClusterError};
use super::decode::{decode_documents, DecodeError};
use super::discovery::{DiscoverySnapshot, Scope};
use super::{DecodedResource, GroupVersionKind};
use crate::manifest::strip_fence;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use thiserror::Error;

/// Identity under which applied fields are owned.
pub const FIELD_MANAGER: &str = "manifester";

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("decode manifest: {0}")]
    Decode(#[from] DecodeError),

    #[error("fetch discovery metadata: {0}")]
    Discovery(#[source] ClusterError),

    #[error("document {index}: no resource found for {gvk}")]
    UnknownResource { index: usize, gvk: GroupVersionKind },

    #[error("document {index}: {gvk} has no metadata.name")]
    MissingName { index: usize, gvk: GroupVersionKind },

    #[error("document {index}: {gvk} has invalid {field} {value:?}")]
    InvalidName {
        index: usize,
        gvk: GroupVersionKind,
        field: &'static str,
        value: String,
    },

    #[error("document {index}: apply {gvk} {name}: {source}")]
    Rejected {
        index: usize,
        gvk: GroupVersionKind,
        name: String,
        #[source]
        source: ClusterError,
    },
}

/// One successfully applied document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedResource {
    pub index: usize,
    pub api_version: String,
    pub kind: String,
    pub resource: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl std::fmt::Display for AppliedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{} ({namespace})", self.resource, self.name),
            None => write!(f, "{}/{}", self.resource, self.name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub applied: Vec<AppliedResource>,
}

/// Applies decoded documents against one cluster.
pub struct Applier<'a, C: ClusterClient + ?Sized> {
    client: &'a C,
    default_namespace: String,
    field_manager: String,
}

impl<'a, C: ClusterClient + ?Sized> Applier<'a, C> {
    pub fn new(client: &'a C, default_namespace: &str) -> Self {
        Self {
            client,
            default_namespace: default_namespace.to_string(),
            field_manager: FIELD_MANAGER.to_string(),
        }
    }

    /// Apply `documents` in order, stopping at the first failure. Discovery
    /// is fetched once, when the first document arrives.
    pub fn apply<I>(&self, documents: I) -> Result<ApplySummary, ApplyError>
    where
        I: IntoIterator<Item = Result<DecodedResource, DecodeError>>,
    {
        let start = Instant::now();
        let mut documents = documents.into_iter();
        let mut summary = ApplySummary::default();

        if let Some(first) = documents.next() {
            let first = first?;
            let snapshot = self
                .client
                .discovery_metadata()
                .map_err(ApplyError::Discovery)?;
            for resource in std::iter::once(Ok(first)).chain(documents) {
                summary.applied.push(self.apply_one(&snapshot, resource?)?);
            }
        }

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            applied = summary.applied.len(),
            "apply complete"
        );
        Ok(summary)
    }

    fn apply_one(
        &self,
        snapshot: &DiscoverySnapshot,
        mut resource: DecodedResource,
    ) -> Result<AppliedResource, ApplyError> {
        let index = resource.index;
        let mapping = snapshot
            .resolve(&resource.gvk)
            .map_err(|err| ApplyError::UnknownResource { index, gvk: err.gvk })?;
        let name = resource
            .name()
            .map(str::to_string)
            .ok_or_else(|| ApplyError::MissingName {
                index,
                gvk: resource.gvk.clone(),
            })?;

        let namespace = match mapping.scope {
            Scope::Namespaced => {
                let namespace = resource
                    .namespace()
                    .unwrap_or(&self.default_namespace)
                    .to_string();
                resource.set_namespace(&namespace);
                Some(namespace)
            }
            Scope::Cluster => {
                resource.clear_namespace();
                None
            }
        };

        let gvk = resource.gvk.clone();
        let segments = [("name", Some(name.as_str())), ("namespace", namespace.as_deref())];
        for (field, value) in segments {
            if let Some(value) = value.filter(|value| !is_path_segment(value)) {
                return Err(ApplyError::InvalidName {
                    index,
                    gvk,
                    field,
                    value: value.to_string(),
                });
            }
        }
        let object = Value::Object(resource.object);
        self.client
            .dynamic_apply(&mapping, namespace.as_deref(), &object, &self.field_manager)
            .map_err(|source| ApplyError::Rejected {
                index,
                gvk: gvk.clone(),
                name: name.clone(),
                source,
            })?;

        let applied = AppliedResource {
            index,
            api_version: gvk.api_version(),
            kind: gvk.kind,
            resource: mapping.resource,
            name,
            namespace,
        };
        tracing::info!(index, resource = %applied, "applied");
        Ok(applied)
    }
}

/// Names and namespaces become request path segments.
fn is_path_segment(value: &str) -> bool {
    let reserved = |ch: char| {
        matches!(ch, '/' | '\\' | '?' | '#' | '%') || ch.is_whitespace() || ch.is_control()
    };
    value != "." && value != ".." && !value.chars().any(reserved)
}

/// Strip any fence from `text`, decode it, and apply every document.
pub fn apply_manifest<C: ClusterClient + ?Sized>(
    client: &C,
    text: &str,
    default_namespace: &str,
) -> Result<ApplySummary, ApplyError> {
    let body = strip_fence(text);
    Applier::new(client, default_namespace).apply(decode_documents(&body))
}

#[cfg(test)]
#[path = "apply_tests.rs"]
mod tests;
