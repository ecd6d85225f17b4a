use super::*;
use std::fs;

const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: dev
clusters:
- name: dev-cluster
  cluster:
    server: https://dev.example:6443/
    certificate-authority: ca.pem
- name: prod-cluster
  cluster:
    server: https://prod.example:6443
    certificate-authority-data: LS0tLS1CRUdJTiBDRVJUSUZJQ0FURS0tLS0tCg==
users:
- name: dev-user
  user:
    token: dev-token
- name: prod-user
  user:
    tokenFile: prod-token
- name: exec-user
  user:
    exec:
      apiVersion: client.authentication.k8s.io/v1
      command: aws
contexts:
- name: dev
  context:
    cluster: dev-cluster
    user: dev-user
    namespace: team-a
- name: prod
  context:
    cluster: prod-cluster
    user: prod-user
- name: exec
  context:
    cluster: prod-cluster
    user: exec-user
"#;

fn write_kubeconfig(dir: &Path) -> PathBuf {
    let path = dir.join("config");
    fs::write(&path, KUBECONFIG).expect("write kubeconfig");
    fs::write(dir.join("ca.pem"), "dev ca").expect("write ca");
    fs::write(dir.join("prod-token"), "prod-secret\n").expect("write token");
    path
}

#[test]
fn explicit_server_wins() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ca = temp.path().join("ca.crt");
    fs::write(&ca, "pem").expect("write ca");
    let config = ClusterConfig {
        server: Some("https://127.0.0.1:6443/".to_string()),
        token: Some("t0k3n".to_string()),
        certificate_authority: Some(ca),
        kubeconfig: Some(write_kubeconfig(temp.path())),
        ..ClusterConfig::default()
    };
    let connection = resolve_from(&config, None, None).expect("explicit");
    assert_eq!(connection.server, "https://127.0.0.1:6443");
    assert_eq!(connection.token.as_deref(), Some("t0k3n"));
    assert_eq!(connection.ca_pem.as_deref(), Some(b"pem".as_slice()));
    assert_eq!(connection.default_namespace(), "default");
}

#[test]
fn kubeconfig_current_context_is_used() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = ClusterConfig {
        kubeconfig: Some(write_kubeconfig(temp.path())),
        ..ClusterConfig::default()
    };
    let connection = resolve_from(&config, None, None).expect("kubeconfig");
    assert_eq!(connection.server, "https://dev.example:6443");
    assert_eq!(connection.token.as_deref(), Some("dev-token"));
    assert_eq!(connection.ca_pem.as_deref(), Some(b"dev ca".as_slice()));
    assert_eq!(connection.default_namespace(), "team-a");
}

#[test]
fn named_context_and_config_namespace_override() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = ClusterConfig {
        kubeconfig: Some(write_kubeconfig(temp.path())),
        context: Some("prod".to_string()),
        namespace: Some("ops".to_string()),
        ..ClusterConfig::default()
    };
    let connection = resolve_from(&config, None, None).expect("prod context");
    assert_eq!(connection.server, "https://prod.example:6443");
    assert_eq!(connection.token.as_deref(), Some("prod-secret"));
    assert_eq!(
        connection.ca_pem.as_deref(),
        Some(b"-----BEGIN CERTIFICATE-----\n".as_slice())
    );
    assert_eq!(connection.default_namespace(), "ops");
}

#[test]
fn unsupported_credentials_and_missing_entries_are_errors() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_kubeconfig(temp.path());
    let exec = ClusterConfig {
        kubeconfig: Some(path.clone()),
        context: Some("exec".to_string()),
        ..ClusterConfig::default()
    };
    let err = resolve_from(&exec, None, None).expect_err("exec auth");
    assert!(err.to_string().contains("exec"));

    let missing = ClusterConfig {
        kubeconfig: Some(path),
        context: Some("staging".to_string()),
        ..ClusterConfig::default()
    };
    let err = resolve_from(&missing, None, None).expect_err("missing context");
    assert!(err.to_string().contains("context staging not found"));
}

#[test]
fn fallback_kubeconfig_used_when_nothing_else_is_set() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_kubeconfig(temp.path());
    let connection = resolve_from(&ClusterConfig::default(), None, Some(path)).expect("fallback");
    assert_eq!(connection.server, "https://dev.example:6443");

    let err = resolve_from(&ClusterConfig::default(), None, None).expect_err("nothing configured");
    assert!(matches!(err, ConfigError::Cluster(_)));
}

#[test]
fn in_cluster_service_account_outranks_fallback_kubeconfig() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_kubeconfig(temp.path());
    let in_cluster = Some(("10.0.0.1".to_string(), "443".to_string()));
    match resolve_from(&ClusterConfig::default(), in_cluster, Some(path)) {
        Ok(connection) => assert_eq!(connection.server, "https://10.0.0.1:443"),
        Err(err) => assert!(err.to_string().contains("serviceaccount"), "{err}"),
    }
}

#[test]
fn service_account_directory_is_read() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("token"), "sa-token\n").expect("token");
    fs::write(temp.path().join("ca.crt"), "sa ca").expect("ca");
    fs::write(temp.path().join("namespace"), "workloads").expect("namespace");

    let connection = from_service_account(temp.path(), "10.0.0.1", "443").expect("in-cluster");
    assert_eq!(connection.server, "https://10.0.0.1:443");
    assert_eq!(connection.token.as_deref(), Some("sa-token"));
    assert_eq!(connection.default_namespace(), "workloads");

    let connection = from_service_account(temp.path(), "fd00::1", "443").expect("ipv6");
    assert_eq!(connection.server, "https://[fd00::1]:443");
}

#[test]
fn debug_output_redacts_token() {
    let connection = ClusterConnection {
        server: "https://k8s".to_string(),
        token: Some("secret".to_string()),
        ..ClusterConnection::default()
    };
    let rendered = format!("{connection:?}");
    assert!(!rendered.contains("secret"));
    assert!(rendered.contains("<redacted>"));
}
