//! Discovery documents and kind-to-endpoint resolution.
use super::GroupVersionKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// `GET /api`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiVersions {
    #[serde(default)]
    pub versions: Vec<String>,
}

/// `GET /apis`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiGroupList {
    #[serde(default)]
    pub groups: Vec<ApiGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGroup {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<GroupVersionForDiscovery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_version: Option<GroupVersionForDiscovery>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupVersionForDiscovery {
    pub group_version: String,
    pub version: String,
}

/// `GET /api/{version}` or `GET /apis/{group}/{version}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResourceList {
    #[serde(default)]
    pub group_version: String,
    #[serde(default)]
    pub resources: Vec<ApiResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResource {
    /// Plural endpoint name, `pods/status` for subresources.
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub namespaced: bool,
}

/// Resources of one API group, keyed by version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiGroupResources {
    /// Empty for the core group.
    pub group: String,
    pub preferred_version: String,
    pub versions: BTreeMap<String, Vec<ApiResource>>,
}

/// Cluster catalog captured for a single apply run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverySnapshot {
    pub groups: Vec<ApiGroupResources>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Namespaced,
    Cluster,
}

/// Where and how a kind is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMapping {
    pub group: String,
    pub version: String,
    pub resource: String,
    pub kind: String,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no resource serves {gvk}")]
pub struct UnknownResource {
    pub gvk: GroupVersionKind,
}

impl DiscoverySnapshot {
    /// Find the endpoint serving `gvk`. An empty version means the group's
    /// preferred version.
    pub fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResourceMapping, UnknownResource> {
        let unknown = || UnknownResource { gvk: gvk.clone() };
        let group = self
            .groups
            .iter()
            .find(|group| group.group == gvk.group)
            .ok_or_else(unknown)?;
        let version = if gvk.version.is_empty() {
            group.preferred_version.as_str()
        } else {
            gvk.version.as_str()
        };
        let resource = group
            .versions
            .get(version)
            .into_iter()
            .flatten()
            .find(|resource| resource.kind == gvk.kind && !resource.name.contains('/'))
            .ok_or_else(unknown)?;
        Ok(ResourceMapping {
            group: group.group.clone(),
            version: version.to_string(),
            resource: resource.name.clone(),
            kind: resource.kind.clone(),
            scope: if resource.namespaced {
                Scope::Namespaced
            } else {
                Scope::Cluster
            },
        })
    }

    /// Record the resources served under `group_version`.
    pub fn insert(&mut self, group: &str, preferred_version: &str, list: ApiResourceList) {
        let version = list
            .group_version
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let index = match self.groups.iter().position(|entry| entry.group == group) {
            Some(index) => index,
            None => {
                self.groups.push(ApiGroupResources {
                    group: group.to_string(),
                    preferred_version: preferred_version.to_string(),
                    versions: BTreeMap::new(),
                });
                self.groups.len() - 1
            }
        };
        self.groups[index].versions.insert(version, list.resources);
    }

    pub fn resource_count(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|group| group.versions.values())
            .map(Vec::len)
            .sum()
    }
}

impl ResourceMapping {
    /// Request path for one named object.
    pub fn api_path(&self, namespace: Option<&str>, name: &str) -> String {
        let mut path = if self.group.is_empty() {
            format!("/api/{}", self.version)
        } else {
            format!("/apis/{}/{}", self.group, self.version)
        };
        if let (Scope::Namespaced, Some(namespace)) = (self.scope, namespace) {
            path.push_str("/namespaces/");
            path.push_str(namespace);
        }
        path.push('/');
        path.push_str(&self.resource);
        path.push('/');
        path.push_str(name);
        path
    }
}
