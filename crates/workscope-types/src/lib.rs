//! Shared types for workscope
//!
//! This crate contains data structures used across multiple workscope crates.

mod selector;

pub use selector::{LabelSelector, Requirement, SelectorError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Workload Kinds
// ============================================================================

/// Kind of the top-level controller that owns a set of pods.
///
/// Kinds that are not modelled natively (e.g. `DaemonSet`) are carried as
/// `Other` and resolved through pod owner references instead of selectors.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkloadKind {
    Deployment,
    ReplicaSet,
    ReplicationController,
    DeploymentConfig,
    StatefulSet,
    Job,
    CronJob,
    Pod,
    Other(String),
}

impl WorkloadKind {
    /// Kinds that can be the target of a patch, in the order they are tried
    pub const PATCHABLE: [WorkloadKind; 8] = [
        WorkloadKind::Deployment,
        WorkloadKind::ReplicaSet,
        WorkloadKind::ReplicationController,
        WorkloadKind::DeploymentConfig,
        WorkloadKind::StatefulSet,
        WorkloadKind::Job,
        WorkloadKind::CronJob,
        WorkloadKind::Pod,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Deployment => "Deployment",
            Self::ReplicaSet => "ReplicaSet",
            Self::ReplicationController => "ReplicationController",
            Self::DeploymentConfig => "DeploymentConfig",
            Self::StatefulSet => "StatefulSet",
            Self::Job => "Job",
            Self::CronJob => "CronJob",
            Self::Pod => "Pod",
            Self::Other(kind) => kind,
        }
    }

    /// Precedence used when two owner references claim different kinds for
    /// the same controller name. `None` means the kind has no rank.
    pub fn precedence(&self) -> Option<i32> {
        match self {
            Self::Deployment => Some(6),
            Self::DeploymentConfig => Some(5),
            Self::ReplicaSet => Some(4),
            Self::ReplicationController => Some(3),
            Self::StatefulSet => Some(2),
            Self::Job => Some(1),
            Self::Other(kind) if kind == "DaemonSet" => Some(0),
            Self::Pod => Some(-1),
            Self::CronJob | Self::Other(_) => None,
        }
    }

    /// Kinds that are usually owned by another controller
    pub fn is_child(&self) -> bool {
        matches!(
            self,
            Self::ReplicaSet | Self::ReplicationController | Self::Job
        )
    }
}

impl From<&str> for WorkloadKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "deployment" => Self::Deployment,
            "replicaset" => Self::ReplicaSet,
            "replicationcontroller" => Self::ReplicationController,
            "deploymentconfig" => Self::DeploymentConfig,
            "statefulset" => Self::StatefulSet,
            "job" => Self::Job,
            "cronjob" => Self::CronJob,
            "pod" => Self::Pod,
            _ => Self::Other(s.to_string()),
        }
    }
}

impl From<String> for WorkloadKind {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<WorkloadKind> for String {
    fn from(kind: WorkloadKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Kubernetes Resource Types
// ============================================================================

/// Owner reference as seen on a pod or child controller
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRef {
    pub name: String,
    pub kind: WorkloadKind,
    pub controller: bool,
}

/// Pod information
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub created_by: Vec<OwnerRef>,
    pub created_at: Option<DateTime<Utc>>,
    pub status: PodStatus,
    pub containers: Vec<ContainerInfo>,
    pub node_name: Option<String>,
    pub pod_ip: Option<String>,
    /// Whether a service mesh proxy was injected into the pod
    pub has_sidecar: bool,
    pub proxy_status: Option<ProxyStatus>,
}

impl PodInfo {
    pub fn new(name: String, namespace: String) -> Self {
        Self {
            name,
            namespace,
            labels: BTreeMap::new(),
            created_by: Vec::new(),
            created_at: None,
            status: PodStatus::Unknown,
            containers: Vec::new(),
            node_name: None,
            pod_ip: None,
            has_sidecar: false,
            proxy_status: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum PodStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<&str> for PodStatus {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    pub name: String,
    pub image: Option<String>,
    pub ready: bool,
    pub restart_count: i32,
}

impl ContainerInfo {
    pub fn new(name: String) -> Self {
        Self {
            name,
            image: None,
            ready: false,
            restart_count: 0,
        }
    }
}

/// Sync state of a pod's proxy as reported by the mesh control plane
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyStatus {
    pub cds: String,
    pub eds: String,
    pub lds: String,
    pub rds: String,
}

/// Service information
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub name: String,
    pub namespace: String,
    pub selector: BTreeMap<String, String>,
    pub service_type: Option<String>,
    pub cluster_ip: Option<String>,
    pub ports: Vec<ServicePortInfo>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePortInfo {
    pub name: Option<String>,
    pub port: i32,
    pub protocol: Option<String>,
}

// ============================================================================
// Workload Types
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaCounts {
    pub desired: i32,
    pub current: i32,
    pub available: i32,
}

impl ReplicaCounts {
    /// Format replica status as "available/desired"
    pub fn status(&self) -> String {
        format!("{}/{}", self.available, self.desired)
    }
}

/// A top-level controller (or bare pod) together with the pods it manages
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub name: String,
    pub namespace: String,
    pub kind: WorkloadKind,
    pub labels: BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
    pub resource_version: Option<String>,
    pub replicas: ReplicaCounts,
    pub pod_count: usize,
    pub pods: Vec<PodInfo>,
    pub services: Vec<ServiceInfo>,
}

impl Workload {
    pub fn new(name: String, namespace: String, kind: WorkloadKind) -> Self {
        Self {
            name,
            namespace,
            kind,
            labels: BTreeMap::new(),
            created_at: None,
            resource_version: None,
            replicas: ReplicaCounts::default(),
            pod_count: 0,
            pods: Vec::new(),
            services: Vec::new(),
        }
    }

    pub fn set_pods(&mut self, pods: Vec<PodInfo>) {
        self.pod_count = pods.len();
        self.pods = pods;
    }

    pub fn set_services(&mut self, services: Vec<ServiceInfo>) {
        self.services = services;
    }

    /// Names of the pods belonging to this workload
    pub fn pod_names(&self) -> Vec<&str> {
        self.pods.iter().map(|p| p.name.as_str()).collect()
    }
}

// ============================================================================
// Log Types
// ============================================================================

/// Log severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Map a matched keyword onto a severity, case-insensitively
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Some(Self::Trace),
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARN" => Some(Self::Warn),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// A single parsed log line
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub message: String,
    pub severity: Severity,
    /// RFC 3339 timestamp, second precision, UTC
    pub timestamp: String,
    pub timestamp_unix: i64,
}
