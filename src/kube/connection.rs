//! Where the cluster is and how to authenticate to it.
//!
//! Sources, first match wins:
//! 1. `cluster.server` in the config file (with its token and CA)
//! 2. `cluster.kubeconfig` in the config file
//! 3. the in-cluster service account
//! 4. `KUBECONFIG`, then `~/.kube/config`
use crate::config::{ClusterConfig, ConfigError, DEFAULT_NAMESPACE};
use base64::Engine;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Resolved endpoint and credentials.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ClusterConnection {
    /// Base URL without a trailing slash.
    pub server: String,
    pub token: Option<String>,
    pub ca_pem: Option<Vec<u8>>,
    pub insecure: bool,
    /// Namespace chosen by config or context, if any.
    pub namespace: Option<String>,
}

impl ClusterConnection {
    pub fn default_namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }
}

impl std::fmt::Debug for ClusterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConnection")
            .field("server", &self.server)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("ca_pem", &self.ca_pem.as_ref().map(Vec::len))
            .field("insecure", &self.insecure)
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Resolve the connection for `config` from the process environment.
pub fn resolve_connection(config: &ClusterConfig) -> Result<ClusterConnection, ConfigError> {
    let in_cluster = env::var("KUBERNETES_SERVICE_HOST")
        .ok()
        .zip(env::var("KUBERNETES_SERVICE_PORT").ok())
        .filter(|_| Path::new(SERVICE_ACCOUNT_DIR).join("token").is_file());
    resolve_from(config, in_cluster, default_kubeconfig_path())
}

fn resolve_from(
    config: &ClusterConfig,
    in_cluster: Option<(String, String)>,
    fallback_kubeconfig: Option<PathBuf>,
) -> Result<ClusterConnection, ConfigError> {
    let mut connection = if let Some(server) = non_empty(&config.server) {
        explicit_connection(config, server)?
    } else if let Some(path) = &config.kubeconfig {
        from_kubeconfig(path, config.context.as_deref())?
    } else if let Some((host, port)) = in_cluster {
        tracing::debug!("using in-cluster service account");
        from_service_account(Path::new(SERVICE_ACCOUNT_DIR), &host, &port)?
    } else if let Some(path) = fallback_kubeconfig {
        from_kubeconfig(&path, config.context.as_deref())?
    } else {
        return Err(ConfigError::Cluster(
            "no cluster configured: set cluster.server, cluster.kubeconfig or KUBECONFIG"
                .to_string(),
        ));
    };
    if let Some(namespace) = non_empty(&config.namespace) {
        connection.namespace = Some(namespace.to_string());
    }
    if config.insecure_skip_tls_verify {
        connection.insecure = true;
    }
    tracing::debug!(server = %connection.server, "resolved cluster connection");
    Ok(connection)
}

fn explicit_connection(config: &ClusterConfig, server: &str) -> Result<ClusterConnection, ConfigError> {
    let ca_pem = config
        .certificate_authority
        .as_deref()
        .map(read_file)
        .transpose()?;
    Ok(ClusterConnection {
        server: server.trim_end_matches('/').to_string(),
        token: non_empty(&config.token).map(str::to_string),
        ca_pem,
        insecure: config.insecure_skip_tls_verify,
        namespace: None,
    })
}

fn from_service_account(dir: &Path, host: &str, port: &str) -> Result<ClusterConnection, ConfigError> {
    let host = if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    let token = String::from_utf8_lossy(&read_file(&dir.join("token"))?)
        .trim()
        .to_string();
    let ca_path = dir.join("ca.crt");
    let ca_pem = ca_path.is_file().then(|| read_file(&ca_path)).transpose()?;
    let namespace = fs::read_to_string(dir.join("namespace"))
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    Ok(ClusterConnection {
        server: format!("https://{host}:{port}"),
        token: Some(token),
        ca_pem,
        insecure: false,
        namespace,
    })
}

fn default_kubeconfig_path() -> Option<PathBuf> {
    if let Some(raw) = env::var_os("KUBECONFIG").filter(|value| !value.is_empty()) {
        if let Some(path) = env::split_paths(&raw).find(|path| path.is_file()) {
            return Some(path);
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".kube").join("config"))
        .filter(|path| path.is_file())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    #[serde(default)]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<Named<KubeCluster>>,
    #[serde(default)]
    users: Vec<Named<KubeUser>>,
    #[serde(default)]
    contexts: Vec<Named<KubeContext>>,
}

#[derive(Debug, Deserialize)]
struct Named<T> {
    name: String,
    #[serde(alias = "cluster", alias = "user", alias = "context")]
    value: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct KubeCluster {
    server: String,
    #[serde(default)]
    certificate_authority: Option<PathBuf>,
    #[serde(default)]
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct KubeUser {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "tokenFile")]
    token_file: Option<PathBuf>,
    #[serde(default)]
    client_certificate: Option<PathBuf>,
    #[serde(default)]
    client_certificate_data: Option<String>,
    #[serde(default)]
    exec: Option<serde_yaml::Value>,
    #[serde(default)]
    auth_provider: Option<serde_yaml::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct KubeContext {
    cluster: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    namespace: Option<String>,
}

fn from_kubeconfig(path: &Path, context: Option<&str>) -> Result<ClusterConnection, ConfigError> {
    let raw = read_file(path)?;
    let kubeconfig: Kubeconfig = serde_yaml::from_slice(&raw)
        .map_err(|err| ConfigError::Cluster(format!("parse {}: {err}", path.display())))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let context_name = context
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or(kubeconfig.current_context.as_deref())
        .ok_or_else(|| {
            ConfigError::Cluster(format!("{}: no current-context set", path.display()))
        })?;
    let context = lookup(&kubeconfig.contexts, context_name, "context", path)?;
    let cluster = lookup(&kubeconfig.clusters, &context.cluster, "cluster", path)?;

    let mut token = None;
    if !context.user.is_empty() {
        let user = lookup(&kubeconfig.users, &context.user, "user", path)?;
        if user.exec.is_some() || user.auth_provider.is_some() {
            return Err(ConfigError::Cluster(format!(
                "user {}: exec and auth-provider credentials are not supported",
                context.user
            )));
        }
        if user.client_certificate.is_some() || user.client_certificate_data.is_some() {
            return Err(ConfigError::Cluster(format!(
                "user {}: client certificate credentials are not supported",
                context.user
            )));
        }
        token = match (&user.token, &user.token_file) {
            (Some(token), _) => Some(token.trim().to_string()),
            (None, Some(file)) => Some(
                String::from_utf8_lossy(&read_file(&base_dir.join(file))?)
                    .trim()
                    .to_string(),
            ),
            (None, None) => None,
        };
    }

    let ca_pem = match (&cluster.certificate_authority_data, &cluster.certificate_authority) {
        (Some(data), _) => Some(
            base64::engine::general_purpose::STANDARD
                .decode(data.trim())
                .map_err(|err| {
                    ConfigError::Cluster(format!(
                        "cluster {}: certificate-authority-data: {err}",
                        context.cluster
                    ))
                })?,
        ),
        (None, Some(file)) => Some(read_file(&base_dir.join(file))?),
        (None, None) => None,
    };

    Ok(ClusterConnection {
        server: cluster.server.trim_end_matches('/').to_string(),
        token,
        ca_pem,
        insecure: cluster.insecure_skip_tls_verify,
        namespace: context
            .namespace
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string),
    })
}

fn lookup<'a, T>(
    entries: &'a [Named<T>],
    name: &str,
    what: &str,
    path: &Path,
) -> Result<&'a T, ConfigError> {
    entries
        .iter()
        .find(|entry| entry.name == name)
        .map(|entry| &entry.value)
        .ok_or_else(|| ConfigError::Cluster(format!("{}: {what} {name} not found", path.display())))
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConfigError> {
    fs::read(path).map_err(|err| ConfigError::Cluster(format!("read {}: {err}", path.display())))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
