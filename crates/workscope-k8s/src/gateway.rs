use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Pod, ReplicationController, Service};
use workscope_types::{LabelSelector, WorkloadKind};

use crate::{DeploymentConfig, GatewayError};

/// Options passed through to the pod log endpoint
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodLogRequest {
    pub container: Option<String>,
    pub since_time: Option<DateTime<Utc>>,
    pub tail_lines: Option<i64>,
    pub timestamps: bool,
}

/// Read/patch access to the cluster control plane, one method per resource kind.
///
/// Implementations must report a missing object as [`GatewayError::NotFound`]
/// so callers can tell "absent" apart from "unreachable".
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Confirm the namespace exists and is visible to the caller
    async fn check_namespace(&self, namespace: &str) -> Result<(), GatewayError>;

    /// Whether the cluster serves this kind at all (DeploymentConfig needs OpenShift)
    async fn supports_kind(&self, kind: &WorkloadKind) -> bool;

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<Pod>, GatewayError>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, GatewayError>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, GatewayError>;

    async fn get_deployment(&self, namespace: &str, name: &str)
    -> Result<Deployment, GatewayError>;

    async fn list_replica_sets(&self, namespace: &str) -> Result<Vec<ReplicaSet>, GatewayError>;

    async fn list_replication_controllers(
        &self,
        namespace: &str,
    ) -> Result<Vec<ReplicationController>, GatewayError>;

    async fn list_deployment_configs(
        &self,
        namespace: &str,
    ) -> Result<Vec<DeploymentConfig>, GatewayError>;

    async fn get_deployment_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<DeploymentConfig, GatewayError>;

    async fn list_stateful_sets(&self, namespace: &str) -> Result<Vec<StatefulSet>, GatewayError>;

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSet, GatewayError>;

    async fn list_jobs(&self, namespace: &str) -> Result<Vec<Job>, GatewayError>;

    async fn list_cron_jobs(&self, namespace: &str) -> Result<Vec<CronJob>, GatewayError>;

    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>, GatewayError>;

    /// Apply a JSON merge patch to the named object of the given kind
    async fn patch_workload(
        &self,
        namespace: &str,
        name: &str,
        kind: &WorkloadKind,
        patch: &serde_json::Value,
    ) -> Result<(), GatewayError>;

    /// Read the raw (non-following) log text of a pod container
    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        request: &PodLogRequest,
    ) -> Result<String, GatewayError>;
}
