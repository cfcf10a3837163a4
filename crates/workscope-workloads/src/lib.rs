//! Workload resolution for workscope
//!
//! Reads every controller kind of a namespace concurrently, resolves pod
//! ownership chains down to one top-level controller per workload, and
//! builds [`Workload`](workscope_types::Workload) values with their pods,
//! services and proxy status.

mod builder;
mod config;
mod controller;
mod error;
mod fetch;
mod proxy;
mod resolver;
mod service;
mod update;

pub use config::{DEFAULT_APP_LABEL, DEFAULT_SIDECAR_ANNOTATION, WorkloadConfig};
pub use error::WorkloadError;
pub use proxy::{NoProxyStatus, ProxyStatusSource};
pub use resolver::controller_priority;
pub use service::WorkloadService;

// Re-export types used in our public API
pub use workscope_types::{PodInfo, Workload, WorkloadKind};
