//! Cluster transport: discovery reads and server-side apply.
use super::connection::ClusterConnection;
use super::discovery::{ApiGroupList, ApiResourceList, ApiVersions, DiscoverySnapshot, ResourceMapping};
use crate::config::ConfigError;
use crate::util::truncate_string;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

const CLUSTER_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const APPLY_CONTENT_TYPE: &str = "application/apply-patch+yaml";
const MESSAGE_PREVIEW_BYTES: usize = 300;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster request {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("cluster rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response from {url}: {message}")]
    Malformed { url: String, message: String },

    #[error("object cannot be applied: {0}")]
    InvalidObject(String),
}

/// The two cluster operations an apply needs.
pub trait ClusterClient {
    /// Fetch a fresh catalog of served kinds.
    fn discovery_metadata(&self) -> Result<DiscoverySnapshot, ClusterError>;

    /// Server-side apply `object` at `mapping`; returns the object the server
    /// persisted.
    fn dynamic_apply(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        object: &Value,
        field_manager: &str,
    ) -> Result<Value, ClusterError>;
}

/// Kubernetes API client over ureq.
pub struct HttpClusterClient {
    agent: ureq::Agent,
    server: String,
    token: Option<String>,
}

impl HttpClusterClient {
    pub fn new(connection: &ClusterConnection) -> Result<Self, ConfigError> {
        let mut builder = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(CLUSTER_REQUEST_TIMEOUT));
        if connection.insecure || connection.ca_pem.is_some() {
            builder = builder.tls_config(tls_config(connection)?);
        }
        Ok(Self {
            agent: ureq::Agent::new_with_config(builder.build()),
            server: connection.server.clone(),
            token: connection.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClusterError> {
        let url = self.url(path);
        let start = Instant::now();
        let mut request = self.agent.get(&url).header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        let mut response = request.call().map_err(|err| transport(&url, err))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| transport(&url, err))?;
        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            status,
            path,
            "discovery request complete"
        );
        if !(200..300).contains(&status) {
            return Err(rejected(status, &body));
        }
        serde_json::from_str(&body).map_err(|err| ClusterError::Malformed {
            url,
            message: err.to_string(),
        })
    }

    /// Resources of one group version. Versions the server refuses to
    /// describe (aggregated APIs that are down) are skipped.
    fn resource_list(&self, path: &str) -> Result<Option<ApiResourceList>, ClusterError> {
        match self.get::<ApiResourceList>(path) {
            Ok(list) => Ok(Some(list)),
            Err(ClusterError::Rejected { status, message }) => {
                tracing::warn!(path, status, message = %message, "skipping unavailable group version");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

impl ClusterClient for HttpClusterClient {
    fn discovery_metadata(&self) -> Result<DiscoverySnapshot, ClusterError> {
        let start = Instant::now();
        let mut snapshot = DiscoverySnapshot::default();

        let core: ApiVersions = self.get("/api")?;
        let core_preferred = core.versions.first().cloned().unwrap_or_default();
        for version in &core.versions {
            if let Some(mut list) = self.resource_list(&format!("/api/{version}"))? {
                if list.group_version.is_empty() {
                    list.group_version = version.clone();
                }
                snapshot.insert("", &core_preferred, list);
            }
        }

        let groups: ApiGroupList = self.get("/apis")?;
        for group in &groups.groups {
            let preferred = group
                .preferred_version
                .as_ref()
                .or(group.versions.first())
                .map(|version| version.version.clone())
                .unwrap_or_default();
            for version in &group.versions {
                let path = format!("/apis/{}", version.group_version);
                if let Some(mut list) = self.resource_list(&path)? {
                    if list.group_version.is_empty() {
                        list.group_version = version.group_version.clone();
                    }
                    snapshot.insert(&group.name, &preferred, list);
                }
            }
        }

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            groups = snapshot.groups.len(),
            resources = snapshot.resource_count(),
            "discovery complete"
        );
        Ok(snapshot)
    }

    fn dynamic_apply(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<&str>,
        object: &Value,
        field_manager: &str,
    ) -> Result<Value, ClusterError> {
        let name = object
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ClusterError::InvalidObject("metadata.name is required".to_string()))?;
        let path = mapping.api_path(namespace, name);
        let url = format!("{}?fieldManager={field_manager}", self.url(&path));
        let body = serde_json::to_vec(object)
            .map_err(|err| ClusterError::InvalidObject(err.to_string()))?;

        let start = Instant::now();
        let mut request = self
            .agent
            .patch(&url)
            .header("Content-Type", APPLY_CONTENT_TYPE)
            .header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        let mut response = request.send(&body[..]).map_err(|err| transport(&url, err))?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|err| transport(&url, err))?;
        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            status,
            path = %path,
            "apply request complete"
        );
        if !(200..300).contains(&status) {
            return Err(rejected(status, &text));
        }
        serde_json::from_str(&text).map_err(|err| ClusterError::Malformed {
            url,
            message: err.to_string(),
        })
    }
}

fn tls_config(connection: &ClusterConnection) -> Result<ureq::tls::TlsConfig, ConfigError> {
    use ureq::tls::{parse_pem, PemItem, RootCerts, TlsConfig};

    let mut builder = TlsConfig::builder().disable_verification(connection.insecure);
    if let Some(pem) = &connection.ca_pem {
        let mut certs = Vec::new();
        for item in parse_pem(pem) {
            match item {
                Ok(PemItem::Certificate(cert)) => certs.push(cert.to_owned()),
                Ok(_) => {}
                Err(err) => {
                    return Err(ConfigError::Cluster(format!(
                        "certificate authority: {err}"
                    )))
                }
            }
        }
        if certs.is_empty() && !connection.insecure {
            return Err(ConfigError::Cluster(
                "certificate authority contains no certificates".to_string(),
            ));
        }
        if !certs.is_empty() {
            builder = builder.root_certs(RootCerts::Specific(Arc::new(certs)));
        }
    }
    Ok(builder.build())
}

fn transport(url: &str, err: ureq::Error) -> ClusterError {
    ClusterError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}

/// Prefer the `message` of a Kubernetes `Status` body.
fn rejected(status: u16, body: &str) -> ClusterError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message")?.as_str().map(str::to_string))
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| truncate_string(body.trim(), MESSAGE_PREVIEW_BYTES));
    ClusterError::Rejected { status, message }
}
