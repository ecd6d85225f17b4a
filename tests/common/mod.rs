//! Shared test infrastructure for integration tests.

use manifester::cache::{derive_key, encode_value, CompletionCache, FileCache};
use manifester::config::load_config;
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Isolated config directory, file cache and optional fake cluster.
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
}

impl TestFixture {
    /// Config with a `cozebot` provider pointed at an unreachable endpoint, so
    /// any provider call fails fast.
    pub fn new(cluster_server: Option<&str>) -> anyhow::Result<Self> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.json");
        let mut config = json!({
            "ai": {
                "default_provider": "cozebot",
                "providers": [{
                    "name": "cozebot",
                    "password": "test-token",
                    "bot_id": "bot-1",
                    "base_url": "http://127.0.0.1:9"
                }]
            },
            "cache": {"type": "file", "path": temp_dir.path().join("cache")},
        });
        if let Some(server) = cluster_server {
            config["cluster"] = json!({"server": server, "token": "cluster-token"});
        }
        std::fs::write(&config_path, serde_json::to_vec_pretty(&config)?)?;
        Ok(Self {
            temp_dir,
            config_path,
        })
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.temp_dir.path().join("cache")
    }

    /// Store `completion` as the default provider's cached answer for
    /// `requirement`.
    pub fn seed_cache(&self, requirement: &str, completion: &str) -> anyhow::Result<()> {
        let config = load_config(&self.config_path)?;
        let identity = config.ai.selected_provider()?.cache_identity();
        let cache = FileCache::new(self.cache_dir());
        cache.store(
            &derive_key(&identity, config.language(), requirement),
            &encode_value(completion),
        )?;
        Ok(())
    }

    pub fn write_file(&self, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Run the binary with `--config` pointing at this fixture.
    pub fn run(&self, args: &[&str], stdin: Option<&str>) -> anyhow::Result<Output> {
        let mut command = Command::new(manifester_bin());
        command
            .arg("--config")
            .arg(&self.config_path)
            .args(args)
            .env_remove("MANIFESTER_CONFIG")
            .env_remove("KUBECONFIG")
            .env("MANIFESTER_LOG", "manifester=debug")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = command.spawn()?;
        if let Some(mut pipe) = child.stdin.take() {
            if let Some(input) = stdin {
                pipe.write_all(input.as_bytes())?;
            }
        }
        Ok(child.wait_with_output()?)
    }
}

pub fn manifester_bin() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_manifester"))
}

/// Kubernetes API stand-in serving a small discovery catalog and echoing
/// applied objects back. Objects named `rejected` get a 422.
pub struct FakeCluster {
    server: MockServer,
}

impl FakeCluster {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(any()).respond_with(respond).mount(&server).await;
        Self { server }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Apply requests as `(path?query, body)`, in arrival order.
    pub async fn applied(&self) -> Vec<(String, Value)> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.method.as_str() == "PATCH")
            .map(|request| {
                let target = match request.url.query() {
                    Some(query) => format!("{}?{query}", request.url.path()),
                    None => request.url.path().to_string(),
                };
                let body = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
                (target, body)
            })
            .collect()
    }
}

fn respond(request: &Request) -> ResponseTemplate {
    let body = match (request.method.as_str(), request.url.path()) {
        ("GET", "/api") => json!({"versions": ["v1"]}),
        ("GET", "/api/v1") => json!({"groupVersion": "v1", "resources": [
            {"name": "namespaces", "kind": "Namespace", "namespaced": false},
            {"name": "configmaps", "kind": "ConfigMap", "namespaced": true}
        ]}),
        ("GET", "/apis") => json!({"groups": [{"name": "apps",
            "versions": [{"groupVersion": "apps/v1", "version": "v1"}],
            "preferredVersion": {"groupVersion": "apps/v1", "version": "v1"}}]}),
        ("GET", "/apis/apps/v1") => json!({"groupVersion": "apps/v1", "resources": [
            {"name": "deployments", "kind": "Deployment", "namespaced": true}
        ]}),
        ("PATCH", _) => {
            let object: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
            if object["metadata"]["name"] == "rejected" {
                return ResponseTemplate::new(422)
                    .set_body_json(json!({"kind": "Status", "message": "admission denied"}));
            }
            object
        }
        _ => return ResponseTemplate::new(404).set_body_json(json!({"message": "not found"})),
    };
    ResponseTemplate::new(200).set_body_json(body)
}
