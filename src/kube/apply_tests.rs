use super::*;
use crate::kube::discovery::{ApiResource, ApiResourceList, ResourceMapping};
use std::cell::{Cell, RefCell};

#[derive(Debug, Clone, PartialEq)]
struct ApplyCall {
    resource: String,
    namespace: Option<String>,
    object: Value,
    field_manager: String,
}

#[derive(Default)]
struct FakeCluster {
    discovery_calls: Cell<usize>,
    discovery_fails: bool,
    reject_names: Vec<&'static str>,
    applied: RefCell<Vec<ApplyCall>>,
}

impl FakeCluster {
    fn calls(&self) -> Vec<ApplyCall> {
        self.applied.borrow().clone()
    }

    fn names(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|call| call.object["metadata"]["name"].as_str().unwrap_or("").to_string())
            .collect()
    }
}

fn resource(name: &str, kind: &str, namespaced: bool) -> ApiResource {
    ApiResource {
        name: name.to_string(),
        kind: kind.to_string(),
        namespaced,
    }
}

impl ClusterClient for FakeCluster {
    fn discovery_metadata(&self) -> Result<DiscoverySnapshot, ClusterError> {
        self.discovery_calls.set(self.discovery_calls.get() + 1);
        if self.discovery_fails {
            return Err(ClusterError::Transport {
                url: "https://cluster/api".to_string(),
                message: "connection refused".to_string(),
            });
        }
        let mut snapshot = DiscoverySnapshot::default();
        snapshot.insert(
            "",
            "v1",
            ApiResourceList {
                group_version: "v1".to_string(),
                resources: vec![
                    resource("namespaces", "Namespace", false),
                    resource("configmaps", "ConfigMap", true),
                    resource("services", "Service", true),
                ],
            },
        );
        snapshot.insert(
            "apps",
            "v1",
            ApiResourceList {
                group_version: "apps/v1".to_string(),
                resources: vec![resource("deployments", "Deployment", true)],
            },
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
        let name = object["metadata"]["name"].as_str().unwrap_or_default();
        if self.reject_names.contains(&name) {
            return Err(ClusterError::Rejected {
                status: 422,
                message: format!("{name} is invalid"),
            });
        }
        self.applied.borrow_mut().push(ApplyCall {
            resource: mapping.resource.clone(),
            namespace: namespace.map(str::to_string),
            object: object.clone(),
            field_manager: field_manager.to_string(),
        });
        Ok(object.clone())
    }
}

const THREE_DOCUMENTS: &str = "\
apiVersion: v1
kind: Namespace
metadata:
  name: shop
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: shop
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
";

#[test]
fn applies_in_document_order_with_field_manager() {
    let cluster = FakeCluster::default();
    let summary = apply_manifest(&cluster, THREE_DOCUMENTS, "default").expect("apply");

    assert_eq!(cluster.names(), vec!["shop", "web", "settings"]);
    assert_eq!(cluster.discovery_calls.get(), 1);
    assert!(cluster
        .calls()
        .iter()
        .all(|call| call.field_manager == FIELD_MANAGER));
    let indexes: Vec<usize> = summary.applied.iter().map(|applied| applied.index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);
    assert_eq!(summary.applied[1].to_string(), "deployments/web (shop)");
}

#[test]
fn namespaced_resources_get_default_namespace() {
    let cluster = FakeCluster::default();
    apply_manifest(&cluster, THREE_DOCUMENTS, "staging").expect("apply");
    let calls = cluster.calls();

    assert_eq!(calls[0].namespace, None);
    assert_eq!(calls[1].namespace.as_deref(), Some("shop"));
    assert_eq!(calls[2].namespace.as_deref(), Some("staging"));
    assert_eq!(calls[2].object["metadata"]["namespace"], "staging");
}

#[test]
fn cluster_scoped_resources_never_carry_a_namespace() {
    let cluster = FakeCluster::default();
    let text = "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: shop\n  namespace: leftover\n";
    let summary = apply_manifest(&cluster, text, "default").expect("apply");
    let call = &cluster.calls()[0];
    assert_eq!(call.namespace, None);
    assert!(call.object["metadata"].get("namespace").is_none());
    assert_eq!(summary.applied[0].namespace, None);
}

#[test]
fn unknown_kind_stops_before_later_documents() {
    let cluster = FakeCluster::default();
    let text = "\
apiVersion: v1
kind: ConfigMap
metadata:
  name: a
---
apiVersion: example.com/v1
kind: Widget
metadata:
  name: b
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: c
";
    let err = apply_manifest(&cluster, text, "default").expect_err("unknown kind");
    match err {
        ApplyError::UnknownResource { index, gvk } => {
            assert_eq!(index, 1);
            assert_eq!(gvk.kind, "Widget");
            assert_eq!(gvk.group, "example.com");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(cluster.names(), vec!["a"]);
}

#[test]
fn stale_api_version_is_unknown() {
    let cluster = FakeCluster::default();
    let text = "apiVersion: extensions/v1beta1\nkind: Deployment\nmetadata:\n  name: old\n";
    assert!(matches!(
        apply_manifest(&cluster, text, "default"),
        Err(ApplyError::UnknownResource { index: 0, .. })
    ));
}

#[test]
fn decode_error_after_first_document_keeps_first_applied() {
    let cluster = FakeCluster::default();
    let text = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n---\nkind: [unclosed\n";
    let err = apply_manifest(&cluster, text, "default").expect_err("decode error");
    assert!(matches!(err, ApplyError::Decode(DecodeError { index: 1, .. })));
    assert_eq!(cluster.names(), vec!["a"]);
}

#[test]
fn rejection_names_the_document() {
    let cluster = FakeCluster {
        reject_names: vec!["web"],
        ..FakeCluster::default()
    };
    let err = apply_manifest(&cluster, THREE_DOCUMENTS, "default").expect_err("rejected");
    match &err {
        ApplyError::Rejected {
            index, name, source, ..
        } => {
            assert_eq!(*index, 1);
            assert_eq!(name, "web");
            assert!(matches!(source, ClusterError::Rejected { status: 422, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("apps/v1, Kind=Deployment"));
    assert_eq!(cluster.names(), vec!["shop"]);
}

#[test]
fn missing_name_is_rejected_before_any_request() {
    let cluster = FakeCluster::default();
    let text = "apiVersion: v1\nkind: ConfigMap\ndata:\n  a: b\n";
    let err = apply_manifest(&cluster, text, "default").expect_err("missing name");
    assert!(matches!(err, ApplyError::MissingName { index: 0, .. }));
    assert!(cluster.calls().is_empty());
}

#[test]
fn empty_stream_makes_no_cluster_calls() {
    let cluster = FakeCluster::default();
    let summary = apply_manifest(&cluster, "```yaml\n---\n```", "default").expect("empty");
    assert!(summary.applied.is_empty());
    assert_eq!(cluster.discovery_calls.get(), 0);
}

#[test]
fn discovery_failure_is_reported() {
    let cluster = FakeCluster {
        discovery_fails: true,
        ..FakeCluster::default()
    };
    let err = apply_manifest(&cluster, THREE_DOCUMENTS, "default").expect_err("discovery");
    assert!(matches!(err, ApplyError::Discovery(ClusterError::Transport { .. })));
    assert!(cluster.calls().is_empty());
}

#[test]
fn fenced_json_stream_is_applied() {
    let cluster = FakeCluster::default();
    let text = "```json\n{\"apiVersion\": \"v1\", \"kind\": \"Service\", \"metadata\": {\"name\": \"api\"}}\n```";
    apply_manifest(&cluster, text, "web").expect("apply json");
    let call = &cluster.calls()[0];
    assert_eq!(call.resource, "services");
    assert_eq!(call.namespace.as_deref(), Some("web"));
}

#[test]
fn decode_error_in_first_document_skips_discovery() {
    let cluster = FakeCluster::default();
    let err = apply_manifest(&cluster, "kind: [unclosed\n", "default").expect_err("decode");
    assert!(matches!(err, ApplyError::Decode(DecodeError { index: 0, .. })));
    assert_eq!(cluster.discovery_calls.get(), 0);
}

#[test]
fn path_like_names_and_namespaces_are_refused() {
    let cluster = FakeCluster::default();
    let text = "\
apiVersion: v1
kind: ConfigMap
metadata:
  name: ok
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: ../../secrets/token
";
    let err = apply_manifest(&cluster, text, "default").expect_err("slash in name");
    match &err {
        ApplyError::InvalidName {
            index, field, value, ..
        } => {
            assert_eq!(*index, 1);
            assert_eq!(*field, "name");
            assert_eq!(value, "../../secrets/token");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("invalid name"));
    assert_eq!(cluster.names(), vec!["ok"]);

    let cluster = FakeCluster::default();
    let text = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: web\n  namespace: kube-system/secrets\n";
    assert!(matches!(
        apply_manifest(&cluster, text, "default"),
        Err(ApplyError::InvalidName { index: 0, field: "namespace", .. })
    ));
    assert!(matches!(
        apply_manifest(&cluster, "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: web\n", "a?b"),
        Err(ApplyError::InvalidName { field: "namespace", .. })
    ));
    assert!(cluster.calls().is_empty());
}
