//! Kubernetes gateway for workscope
//!
//! This crate provides the boundary to the cluster API: per-kind list, get
//! and patch reads, pod log retrieval, namespace access checks, and an
//! optional read-through cache with the same shapes.

mod cache;
mod client;
mod deployment_config;
mod error;
mod gateway;

#[cfg(any(test, feature = "testing"))]
pub mod fake;

pub use cache::{CacheConfig, NamespaceCache, SnapshotCache};
pub use client::KubeGateway;
pub use deployment_config::{
    DeploymentConfig, DeploymentConfigSpec, DeploymentConfigStatus, deployment_config_resource,
};
pub use error::GatewayError;
pub use gateway::{ClusterGateway, PodLogRequest};

// Re-export types that are used in our public API
pub use workscope_types::{LabelSelector, WorkloadKind};
