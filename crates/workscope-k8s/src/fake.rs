//! Scripted in-memory gateway for tests
//!
//! [`FakeGateway`] serves objects registered through its `with_*` builders,
//! records every call it receives, and can be told to fail specific
//! operations. Patches are applied to the stored objects as JSON merge
//! patches so follow-up reads observe them.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Pod, ReplicationController, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use workscope_types::{LabelSelector, WorkloadKind};

use crate::{ClusterGateway, DeploymentConfig, GatewayError, PodLogRequest};

#[derive(Default)]
struct State {
    pods: Vec<Pod>,
    deployments: Vec<Deployment>,
    replica_sets: Vec<ReplicaSet>,
    replication_controllers: Vec<ReplicationController>,
    deployment_configs: Vec<DeploymentConfig>,
    stateful_sets: Vec<StatefulSet>,
    jobs: Vec<Job>,
    cron_jobs: Vec<CronJob>,
    services: Vec<Service>,
    logs: HashMap<String, String>,
    failures: HashMap<String, String>,
    forbidden: HashSet<String>,
    openshift: bool,
    yielding: bool,
    calls: Vec<String>,
    patches: Vec<RecordedPatch>,
    log_requests: Vec<PodLogRequest>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedPatch {
    pub namespace: String,
    pub name: String,
    pub kind: WorkloadKind,
    pub patch: Value,
}

#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<State>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pods(self, pods: Vec<Pod>) -> Self {
        self.state.lock().pods.extend(pods);
        self
    }

    pub fn with_deployments(self, deployments: Vec<Deployment>) -> Self {
        self.state.lock().deployments.extend(deployments);
        self
    }

    pub fn with_replica_sets(self, replica_sets: Vec<ReplicaSet>) -> Self {
        self.state.lock().replica_sets.extend(replica_sets);
        self
    }

    pub fn with_replication_controllers(self, rcs: Vec<ReplicationController>) -> Self {
        self.state.lock().replication_controllers.extend(rcs);
        self
    }

    pub fn with_deployment_configs(self, dcs: Vec<DeploymentConfig>) -> Self {
        self.state.lock().deployment_configs.extend(dcs);
        self
    }

    pub fn with_stateful_sets(self, stateful_sets: Vec<StatefulSet>) -> Self {
        self.state.lock().stateful_sets.extend(stateful_sets);
        self
    }

    pub fn with_jobs(self, jobs: Vec<Job>) -> Self {
        self.state.lock().jobs.extend(jobs);
        self
    }

    pub fn with_cron_jobs(self, cron_jobs: Vec<CronJob>) -> Self {
        self.state.lock().cron_jobs.extend(cron_jobs);
        self
    }

    pub fn with_services(self, services: Vec<Service>) -> Self {
        self.state.lock().services.extend(services);
        self
    }

    /// Serve `text` as the log of `pod`
    pub fn with_logs(self, pod: &str, text: &str) -> Self {
        self.state
            .lock()
            .logs
            .insert(pod.to_string(), text.to_string());
        self
    }

    /// Report the OpenShift apps API group as available
    pub fn with_openshift(self) -> Self {
        self.state.lock().openshift = true;
        self
    }

    /// Make every call to `op` fail with an upstream error carrying `message`
    pub fn fail(self, op: &str, message: &str) -> Self {
        self.state
            .lock()
            .failures
            .insert(op.to_string(), message.to_string());
        self
    }

    /// Yield to the scheduler before serving each read, so concurrent
    /// callers interleave the way they do against a real API server
    pub fn yielding(self) -> Self {
        self.state.lock().yielding = true;
        self
    }

    pub fn forbid_namespace(self, namespace: &str) -> Self {
        self.state.lock().forbidden.insert(namespace.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == op).count()
    }

    pub fn patches(&self) -> Vec<RecordedPatch> {
        self.state.lock().patches.clone()
    }

    pub fn log_requests(&self) -> Vec<PodLogRequest> {
        self.state.lock().log_requests.clone()
    }

    async fn pause(&self) {
        let yielding = self.state.lock().yielding;
        if yielding {
            tokio::task::yield_now().await;
        }
    }

    /// Record the call and return the scripted failure for it, if any
    fn enter(&self, op: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        state.calls.push(op.to_string());
        match state.failures.get(op) {
            Some(message) => Err(GatewayError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }

    fn read<K, F>(&self, op: &str, namespace: &str, items: F) -> Result<Vec<K>, GatewayError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone,
        F: FnOnce(&State) -> &Vec<K>,
    {
        self.enter(op)?;
        let state = self.state.lock();
        Ok(items(&state)
            .iter()
            .filter(|item| item.meta().namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    fn find<K, F>(&self, op: &str, namespace: &str, name: &str, items: F) -> Result<K, GatewayError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone,
        F: FnOnce(&State) -> &Vec<K>,
    {
        self.read(op, namespace, items)?
            .into_iter()
            .find(|item| item.meta().name.as_deref() == Some(name))
            .ok_or_else(|| GatewayError::NotFound(format!("{} not found", name)))
    }
}

fn same_object(meta: &ObjectMeta, namespace: &str, name: &str) -> bool {
    meta.namespace.as_deref() == Some(namespace) && meta.name.as_deref() == Some(name)
}

/// RFC 7386 JSON merge patch
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn apply_patch<K, M>(
    items: &mut [K],
    meta: M,
    namespace: &str,
    name: &str,
    patch: &Value,
) -> Result<(), GatewayError>
where
    K: Serialize + DeserializeOwned,
    M: Fn(&K) -> &ObjectMeta,
{
    let Some(item) = items
        .iter_mut()
        .find(|item| same_object(meta(item), namespace, name))
    else {
        return Err(GatewayError::NotFound(format!("{} not found", name)));
    };

    let parse_error = |e: serde_json::Error| GatewayError::Parse {
        kind: "patch".to_string(),
        name: name.to_string(),
        reason: e.to_string(),
    };
    let mut value = serde_json::to_value(&*item).map_err(parse_error)?;
    merge_patch(&mut value, patch);
    *item = serde_json::from_value(value).map_err(parse_error)?;
    Ok(())
}

#[async_trait]
impl ClusterGateway for FakeGateway {
    async fn check_namespace(&self, namespace: &str) -> Result<(), GatewayError> {
        self.pause().await;
        self.enter("check_namespace")?;
        if self.state.lock().forbidden.contains(namespace) {
            return Err(GatewayError::Forbidden(format!(
                "namespaces \"{}\" is forbidden",
                namespace
            )));
        }
        Ok(())
    }

    async fn supports_kind(&self, kind: &WorkloadKind) -> bool {
        match kind {
            WorkloadKind::DeploymentConfig => self.state.lock().openshift,
            _ => true,
        }
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<Pod>, GatewayError> {
        self.pause().await;
        let pods = self.read("list_pods", namespace, |s| &s.pods)?;
        let empty = BTreeMap::new();
        Ok(pods
            .into_iter()
            .filter(|pod| selector.matches(pod.metadata.labels.as_ref().unwrap_or(&empty)))
            .collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, GatewayError> {
        self.pause().await;
        self.find("get_pod", namespace, name, |s| &s.pods)
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, GatewayError> {
        self.pause().await;
        self.read("list_deployments", namespace, |s| &s.deployments)
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Deployment, GatewayError> {
        self.pause().await;
        self.find("get_deployment", namespace, name, |s| &s.deployments)
    }

    async fn list_replica_sets(&self, namespace: &str) -> Result<Vec<ReplicaSet>, GatewayError> {
        self.pause().await;
        self.read("list_replica_sets", namespace, |s| &s.replica_sets)
    }

    async fn list_replication_controllers(
        &self,
        namespace: &str,
    ) -> Result<Vec<ReplicationController>, GatewayError> {
        self.pause().await;
        self.read("list_replication_controllers", namespace, |s| {
            &s.replication_controllers
        })
    }

    async fn list_deployment_configs(
        &self,
        namespace: &str,
    ) -> Result<Vec<DeploymentConfig>, GatewayError> {
        self.pause().await;
        self.enter("list_deployment_configs")?;
        Ok(self
            .state
            .lock()
            .deployment_configs
            .iter()
            .filter(|dc| dc.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn get_deployment_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<DeploymentConfig, GatewayError> {
        self.pause().await;
        self.enter("get_deployment_config")?;
        self.state
            .lock()
            .deployment_configs
            .iter()
            .find(|dc| same_object(&dc.metadata, namespace, name))
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("{} not found", name)))
    }

    async fn list_stateful_sets(&self, namespace: &str) -> Result<Vec<StatefulSet>, GatewayError> {
        self.pause().await;
        self.read("list_stateful_sets", namespace, |s| &s.stateful_sets)
    }

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSet, GatewayError> {
        self.pause().await;
        self.find("get_stateful_set", namespace, name, |s| &s.stateful_sets)
    }

    async fn list_jobs(&self, namespace: &str) -> Result<Vec<Job>, GatewayError> {
        self.pause().await;
        self.read("list_jobs", namespace, |s| &s.jobs)
    }

    async fn list_cron_jobs(&self, namespace: &str) -> Result<Vec<CronJob>, GatewayError> {
        self.pause().await;
        self.read("list_cron_jobs", namespace, |s| &s.cron_jobs)
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>, GatewayError> {
        self.pause().await;
        self.read("list_services", namespace, |s| &s.services)
    }

    async fn patch_workload(
        &self,
        namespace: &str,
        name: &str,
        kind: &WorkloadKind,
        patch: &Value,
    ) -> Result<(), GatewayError> {
        self.pause().await;
        self.enter(&format!("patch_{}", kind.as_str().to_lowercase()))?;

        let mut state = self.state.lock();
        state.patches.push(RecordedPatch {
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind: kind.clone(),
            patch: patch.clone(),
        });

        match kind {
            WorkloadKind::Deployment => {
                apply_patch(&mut state.deployments, |d| &d.metadata, namespace, name, patch)
            }
            WorkloadKind::ReplicaSet => {
                apply_patch(&mut state.replica_sets, |r| &r.metadata, namespace, name, patch)
            }
            WorkloadKind::ReplicationController => apply_patch(
                &mut state.replication_controllers,
                |r| &r.metadata,
                namespace,
                name,
                patch,
            ),
            WorkloadKind::DeploymentConfig => apply_patch(
                &mut state.deployment_configs,
                |d| &d.metadata,
                namespace,
                name,
                patch,
            ),
            WorkloadKind::StatefulSet => {
                apply_patch(&mut state.stateful_sets, |s| &s.metadata, namespace, name, patch)
            }
            WorkloadKind::Job => apply_patch(&mut state.jobs, |j| &j.metadata, namespace, name, patch),
            WorkloadKind::CronJob => {
                apply_patch(&mut state.cron_jobs, |c| &c.metadata, namespace, name, patch)
            }
            WorkloadKind::Pod => apply_patch(&mut state.pods, |p| &p.metadata, namespace, name, patch),
            WorkloadKind::Other(other) => Err(GatewayError::Unavailable(format!(
                "patching {} objects is not supported",
                other
            ))),
        }
    }

    async fn pod_logs(
        &self,
        _namespace: &str,
        pod: &str,
        request: &PodLogRequest,
    ) -> Result<String, GatewayError> {
        self.pause().await;
        self.enter("pod_logs")?;
        let mut state = self.state.lock();
        state.log_requests.push(request.clone());
        state
            .logs
            .get(pod)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("pods \"{}\" not found", pod)))
    }
}

/// Builders for cluster objects used in tests
pub mod fixtures {
    use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
    use k8s_openapi::api::batch::v1::{CronJob, Job};
    use k8s_openapi::api::core::v1::{Pod, ReplicationController, Service};
    use serde::de::DeserializeOwned;
    use serde_json::{Map, Value, json};

    use crate::DeploymentConfig;

    pub const SIDECAR_ANNOTATION: &str = "sidecar.istio.io/status";

    fn build<K: DeserializeOwned>(value: Value) -> K {
        serde_json::from_value(value).expect("fixture must describe a valid object")
    }

    fn labels(pairs: &[(&str, &str)]) -> Value {
        Value::Object(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect::<Map<_, _>>(),
        )
    }

    fn api_version_for(kind: &str) -> &'static str {
        match kind {
            "Deployment" | "ReplicaSet" | "StatefulSet" | "DaemonSet" => "apps/v1",
            "Job" | "CronJob" => "batch/v1",
            "DeploymentConfig" => "apps.openshift.io/v1",
            _ => "v1",
        }
    }

    /// Owner reference value for `(kind, name)`
    pub fn owner_ref(kind: &str, name: &str, controller: bool) -> Value {
        json!({
            "apiVersion": api_version_for(kind),
            "kind": kind,
            "name": name,
            "uid": format!("uid-{}", name),
            "controller": controller,
        })
    }

    fn controller_refs(owners: &[(&str, &str)]) -> Value {
        Value::Array(
            owners
                .iter()
                .map(|(kind, name)| owner_ref(kind, name, true))
                .collect(),
        )
    }

    fn pod_value(namespace: &str, name: &str, labels_: &[(&str, &str)], owners: Value) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": name,
                "namespace": namespace,
                "labels": labels(labels_),
                "ownerReferences": owners,
                "creationTimestamp": "2024-03-01T10:00:00Z",
            },
            "spec": {
                "nodeName": "node-1",
                "containers": [{ "name": "app", "image": "registry.local/app:1.0" }]
            },
            "status": {
                "phase": "Running",
                "podIP": "10.0.0.12",
                "containerStatuses": [{
                    "name": "app",
                    "image": "registry.local/app:1.0",
                    "imageID": "",
                    "ready": true,
                    "restartCount": 0
                }]
            }
        })
    }

    /// Pod controlled by each `(kind, name)` in `owners`
    pub fn pod(namespace: &str, name: &str, labels_: &[(&str, &str)], owners: &[(&str, &str)]) -> Pod {
        build(pod_value(namespace, name, labels_, controller_refs(owners)))
    }

    /// Pod with owner references that are not flagged as controllers
    pub fn uncontrolled_pod(
        namespace: &str,
        name: &str,
        labels_: &[(&str, &str)],
        owners: &[(&str, &str)],
    ) -> Pod {
        let refs = owners
            .iter()
            .map(|(kind, owner)| owner_ref(kind, owner, false))
            .collect();
        build(pod_value(namespace, name, labels_, Value::Array(refs)))
    }

    /// Pod carrying the injected proxy annotation
    pub fn sidecar_pod(
        namespace: &str,
        name: &str,
        labels_: &[(&str, &str)],
        owners: &[(&str, &str)],
    ) -> Pod {
        let mut value = pod_value(namespace, name, labels_, controller_refs(owners));
        value["metadata"]["annotations"][SIDECAR_ANNOTATION] = json!("{\"version\":\"1\"}");
        build(value)
    }

    fn template(labels_: &[(&str, &str)]) -> Value {
        json!({
            "metadata": { "labels": labels(labels_) },
            "spec": { "containers": [{ "name": "app", "image": "registry.local/app:1.0" }] }
        })
    }

    fn metadata(namespace: &str, name: &str, owner: Option<(&str, &str)>) -> Value {
        let mut meta = json!({
            "name": name,
            "namespace": namespace,
            "labels": { "owner": name },
            "resourceVersion": "1001",
            "creationTimestamp": "2024-03-01T09:00:00Z",
        });
        if let Some((kind, owner)) = owner {
            meta["ownerReferences"] = json!([owner_ref(kind, owner, true)]);
        }
        meta
    }

    pub fn deployment(namespace: &str, name: &str, labels_: &[(&str, &str)], replicas: i32) -> Deployment {
        build(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": metadata(namespace, name, None),
            "spec": {
                "replicas": replicas,
                "selector": { "matchLabels": labels(labels_) },
                "template": template(labels_)
            },
            "status": { "replicas": replicas, "availableReplicas": replicas }
        }))
    }

    pub fn replica_set(
        namespace: &str,
        name: &str,
        labels_: &[(&str, &str)],
        owner: Option<(&str, &str)>,
    ) -> ReplicaSet {
        build(json!({
            "apiVersion": "apps/v1",
            "kind": "ReplicaSet",
            "metadata": metadata(namespace, name, owner),
            "spec": {
                "replicas": 1,
                "selector": { "matchLabels": labels(labels_) },
                "template": template(labels_)
            },
            "status": { "replicas": 1, "availableReplicas": 1 }
        }))
    }

    pub fn replication_controller(
        namespace: &str,
        name: &str,
        labels_: &[(&str, &str)],
        owner: Option<(&str, &str)>,
    ) -> ReplicationController {
        build(json!({
            "apiVersion": "v1",
            "kind": "ReplicationController",
            "metadata": metadata(namespace, name, owner),
            "spec": {
                "replicas": 1,
                "selector": labels(labels_),
                "template": template(labels_)
            },
            "status": { "replicas": 1, "availableReplicas": 1 }
        }))
    }

    pub fn deployment_config(
        namespace: &str,
        name: &str,
        labels_: &[(&str, &str)],
        replicas: i32,
    ) -> DeploymentConfig {
        build(json!({
            "metadata": metadata(namespace, name, None),
            "spec": {
                "replicas": replicas,
                "selector": labels(labels_),
                "template": template(labels_)
            },
            "status": { "replicas": replicas, "availableReplicas": replicas }
        }))
    }

    pub fn stateful_set(
        namespace: &str,
        name: &str,
        labels_: &[(&str, &str)],
        replicas: i32,
    ) -> StatefulSet {
        build(json!({
            "apiVersion": "apps/v1",
            "kind": "StatefulSet",
            "metadata": metadata(namespace, name, None),
            "spec": {
                "replicas": replicas,
                "serviceName": name,
                "selector": { "matchLabels": labels(labels_) },
                "template": template(labels_)
            },
            "status": { "replicas": replicas, "availableReplicas": replicas }
        }))
    }

    pub fn job(
        namespace: &str,
        name: &str,
        labels_: &[(&str, &str)],
        owner: Option<(&str, &str)>,
    ) -> Job {
        build(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": metadata(namespace, name, owner),
            "spec": { "template": template(labels_) },
            "status": { "active": 1 }
        }))
    }

    pub fn cron_job(namespace: &str, name: &str, labels_: &[(&str, &str)]) -> CronJob {
        build(json!({
            "apiVersion": "batch/v1",
            "kind": "CronJob",
            "metadata": metadata(namespace, name, None),
            "spec": {
                "schedule": "*/5 * * * *",
                "jobTemplate": { "spec": { "template": template(labels_) } }
            }
        }))
    }

    pub fn service(namespace: &str, name: &str, selector: &[(&str, &str)]) -> Service {
        build(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": name, "namespace": namespace },
            "spec": {
                "type": "ClusterIP",
                "clusterIP": "10.96.0.20",
                "selector": labels(selector),
                "ports": [{ "name": "http", "port": 9080, "protocol": "TCP" }]
            }
        }))
    }
}
