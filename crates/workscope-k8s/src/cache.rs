//! Read-through namespace cache
//!
//! A [`NamespaceCache`] serves the same shapes as the gateway for the kinds
//! that are read most often. [`SnapshotCache`] keeps one in-memory snapshot
//! per eligible namespace and reloads it from the gateway once it is older
//! than the configured TTL or after [`NamespaceCache::refresh_namespace`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{Pod, Service};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tracing::debug;
use workscope_types::LabelSelector;

use crate::{ClusterGateway, GatewayError};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Namespaces served from the cache; `"*"` matches every namespace
    pub namespaces: Vec<String>,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            namespaces: vec!["*".to_string()],
            ttl_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn covers(&self, namespace: &str) -> bool {
        self.enabled
            && self
                .namespaces
                .iter()
                .any(|ns| ns == "*" || ns == namespace)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[async_trait]
pub trait NamespaceCache: Send + Sync {
    /// Whether reads for this namespace should be served by the cache
    fn is_namespace_cached(&self, namespace: &str) -> bool;

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<Pod>, GatewayError>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, GatewayError>;

    async fn get_deployment(&self, namespace: &str, name: &str)
    -> Result<Deployment, GatewayError>;

    async fn list_replica_sets(&self, namespace: &str) -> Result<Vec<ReplicaSet>, GatewayError>;

    async fn list_stateful_sets(&self, namespace: &str) -> Result<Vec<StatefulSet>, GatewayError>;

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSet, GatewayError>;

    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>, GatewayError>;

    /// Drop whatever is held for the namespace so the next read sees fresh state
    async fn refresh_namespace(&self, namespace: &str);
}

struct NamespaceSnapshot {
    loaded_at: Instant,
    pods: Vec<Pod>,
    deployments: Vec<Deployment>,
    replica_sets: Vec<ReplicaSet>,
    stateful_sets: Vec<StatefulSet>,
    services: Vec<Service>,
}

/// In-memory cache of whole-namespace snapshots loaded from a gateway
pub struct SnapshotCache {
    source: Arc<dyn ClusterGateway>,
    config: CacheConfig,
    snapshots: RwLock<HashMap<String, Arc<NamespaceSnapshot>>>,
    /// One load at a time per namespace; concurrent readers wait for it
    loads: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SnapshotCache {
    pub fn new(source: Arc<dyn ClusterGateway>, config: CacheConfig) -> Self {
        Self {
            source,
            config,
            snapshots: RwLock::new(HashMap::new()),
            loads: Mutex::new(HashMap::new()),
        }
    }

    fn fresh(&self, namespace: &str) -> Option<Arc<NamespaceSnapshot>> {
        self.snapshots
            .read()
            .get(namespace)
            .filter(|snapshot| snapshot.loaded_at.elapsed() < self.config.ttl())
            .cloned()
    }

    async fn snapshot(&self, namespace: &str) -> Result<Arc<NamespaceSnapshot>, GatewayError> {
        if let Some(snapshot) = self.fresh(namespace) {
            return Ok(snapshot);
        }

        let load = Arc::clone(
            self.loads
                .lock()
                .entry(namespace.to_string())
                .or_default(),
        );
        let _loading = load.lock().await;

        // Another reader may have loaded it while this one waited
        if let Some(snapshot) = self.fresh(namespace) {
            return Ok(snapshot);
        }

        debug!(namespace, "loading namespace snapshot");
        let everything = LabelSelector::everything();
        let (pods, deployments, replica_sets, stateful_sets, services) = tokio::try_join!(
            self.source.list_pods(namespace, &everything),
            self.source.list_deployments(namespace),
            self.source.list_replica_sets(namespace),
            self.source.list_stateful_sets(namespace),
            self.source.list_services(namespace),
        )?;

        let snapshot = Arc::new(NamespaceSnapshot {
            loaded_at: Instant::now(),
            pods,
            deployments,
            replica_sets,
            stateful_sets,
            services,
        });
        self.snapshots
            .write()
            .insert(namespace.to_string(), Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

fn not_found(resource: &str, name: &str) -> GatewayError {
    GatewayError::NotFound(format!("{} \"{}\" not found", resource, name))
}

#[async_trait]
impl NamespaceCache for SnapshotCache {
    fn is_namespace_cached(&self, namespace: &str) -> bool {
        self.config.covers(namespace)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<Pod>, GatewayError> {
        let snapshot = self.snapshot(namespace).await?;
        let empty = BTreeMap::new();
        Ok(snapshot
            .pods
            .iter()
            .filter(|pod| selector.matches(pod.metadata.labels.as_ref().unwrap_or(&empty)))
            .cloned()
            .collect())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, GatewayError> {
        Ok(self.snapshot(namespace).await?.deployments.clone())
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Deployment, GatewayError> {
        self.snapshot(namespace)
            .await?
            .deployments
            .iter()
            .find(|d| d.metadata.name.as_deref() == Some(name))
            .cloned()
            .ok_or_else(|| not_found("deployments.apps", name))
    }

    async fn list_replica_sets(&self, namespace: &str) -> Result<Vec<ReplicaSet>, GatewayError> {
        Ok(self.snapshot(namespace).await?.replica_sets.clone())
    }

    async fn list_stateful_sets(&self, namespace: &str) -> Result<Vec<StatefulSet>, GatewayError> {
        Ok(self.snapshot(namespace).await?.stateful_sets.clone())
    }

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSet, GatewayError> {
        self.snapshot(namespace)
            .await?
            .stateful_sets
            .iter()
            .find(|s| s.metadata.name.as_deref() == Some(name))
            .cloned()
            .ok_or_else(|| not_found("statefulsets.apps", name))
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>, GatewayError> {
        Ok(self.snapshot(namespace).await?.services.clone())
    }

    async fn refresh_namespace(&self, namespace: &str) {
        if self.snapshots.write().remove(namespace).is_some() {
            debug!(namespace, "dropped namespace snapshot");
        }
    }
}
