//! Concurrent fetch of every resource collection a resolution pass needs
//!
//! One task per resource kind runs concurrently; the call waits for all of
//! them before looking at any result, then fails with the first error in
//! kind order.

use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Pod, ReplicationController, Service};
use tracing::{debug, error};
use workscope_k8s::{ClusterGateway, DeploymentConfig, GatewayError, NamespaceCache};
use workscope_types::{LabelSelector, WorkloadKind};

use crate::WorkloadConfig;

/// Collections read for one namespace. Skipped kinds stay empty.
#[derive(Debug, Default)]
pub(crate) struct Resources {
    pub pods: Vec<Pod>,
    pub deployments: Vec<Deployment>,
    pub replica_sets: Vec<ReplicaSet>,
    pub replication_controllers: Vec<ReplicationController>,
    pub deployment_configs: Vec<DeploymentConfig>,
    pub stateful_sets: Vec<StatefulSet>,
    pub jobs: Vec<Job>,
    pub cron_jobs: Vec<CronJob>,
}

pub(crate) struct Fetcher<'a> {
    pub gateway: &'a dyn ClusterGateway,
    pub cache: Option<&'a dyn NamespaceCache>,
    pub config: &'a WorkloadConfig,
    pub namespace: &'a str,
}

impl<'a> Fetcher<'a> {
    /// Cache to read through, when the namespace is served by one
    fn cached(&self) -> Option<&'a dyn NamespaceCache> {
        self.cache
            .filter(|cache| cache.is_namespace_cached(self.namespace))
    }

    async fn included(&self, kind: &WorkloadKind, target: Option<&WorkloadKind>) -> bool {
        if target.is_some_and(|t| t != kind) {
            return false;
        }
        if !self.config.is_included(kind) {
            debug!(namespace = self.namespace, %kind, "kind excluded by configuration");
            return false;
        }
        self.gateway.supports_kind(kind).await
    }

    fn report<T>(&self, what: &str, result: Result<T, GatewayError>) -> Result<T, GatewayError> {
        if let Err(e) = &result {
            error!(namespace = self.namespace, kind = what, error = %e, "error fetching resources");
        }
        result
    }

    /// Single-object reads treat a missing object as absent
    fn absent_if_missing<T>(
        &self,
        what: &str,
        result: Result<T, GatewayError>,
    ) -> Result<Vec<T>, GatewayError> {
        match result {
            Ok(obj) => Ok(vec![obj]),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => self.report(what, Err(e)),
        }
    }

    /// Pods of the namespace, through the cache when it serves the namespace
    pub async fn pods(&self, selector: &LabelSelector) -> Result<Vec<Pod>, GatewayError> {
        let result = match self.cached() {
            Some(cache) => cache.list_pods(self.namespace, selector).await,
            None => self.gateway.list_pods(self.namespace, selector).await,
        };
        self.report("Pod", result)
    }

    async fn deployments(&self) -> Result<Vec<Deployment>, GatewayError> {
        if !self.included(&WorkloadKind::Deployment, None).await {
            return Ok(Vec::new());
        }
        let result = match self.cached() {
            Some(cache) => cache.list_deployments(self.namespace).await,
            None => self.gateway.list_deployments(self.namespace).await,
        };
        self.report("Deployment", result)
    }

    async fn deployment(
        &self,
        name: &str,
        target: Option<&WorkloadKind>,
    ) -> Result<Vec<Deployment>, GatewayError> {
        if !self.included(&WorkloadKind::Deployment, target).await {
            return Ok(Vec::new());
        }
        let result = match self.cached() {
            Some(cache) => cache.get_deployment(self.namespace, name).await,
            None => self.gateway.get_deployment(self.namespace, name).await,
        };
        self.absent_if_missing("Deployment", result)
    }

    async fn replica_sets(
        &self,
        target: Option<&WorkloadKind>,
    ) -> Result<Vec<ReplicaSet>, GatewayError> {
        if !self.included(&WorkloadKind::ReplicaSet, target).await {
            return Ok(Vec::new());
        }
        let result = match self.cached() {
            Some(cache) => cache.list_replica_sets(self.namespace).await,
            None => self.gateway.list_replica_sets(self.namespace).await,
        };
        self.report("ReplicaSet", result)
    }

    async fn replication_controllers(
        &self,
        target: Option<&WorkloadKind>,
    ) -> Result<Vec<ReplicationController>, GatewayError> {
        if !self.included(&WorkloadKind::ReplicationController, target).await {
            return Ok(Vec::new());
        }
        let result = self
            .gateway
            .list_replication_controllers(self.namespace)
            .await;
        self.report("ReplicationController", result)
    }

    async fn deployment_configs(&self) -> Result<Vec<DeploymentConfig>, GatewayError> {
        if !self.included(&WorkloadKind::DeploymentConfig, None).await {
            return Ok(Vec::new());
        }
        let result = self.gateway.list_deployment_configs(self.namespace).await;
        self.report("DeploymentConfig", result)
    }

    async fn deployment_config(
        &self,
        name: &str,
        target: Option<&WorkloadKind>,
    ) -> Result<Vec<DeploymentConfig>, GatewayError> {
        if !self.included(&WorkloadKind::DeploymentConfig, target).await {
            return Ok(Vec::new());
        }
        let result = self.gateway.get_deployment_config(self.namespace, name).await;
        self.absent_if_missing("DeploymentConfig", result)
    }

    async fn stateful_sets(&self) -> Result<Vec<StatefulSet>, GatewayError> {
        if !self.included(&WorkloadKind::StatefulSet, None).await {
            return Ok(Vec::new());
        }
        let result = match self.cached() {
            Some(cache) => cache.list_stateful_sets(self.namespace).await,
            None => self.gateway.list_stateful_sets(self.namespace).await,
        };
        self.report("StatefulSet", result)
    }

    async fn stateful_set(
        &self,
        name: &str,
        target: Option<&WorkloadKind>,
    ) -> Result<Vec<StatefulSet>, GatewayError> {
        if !self.included(&WorkloadKind::StatefulSet, target).await {
            return Ok(Vec::new());
        }
        let result = match self.cached() {
            Some(cache) => cache.get_stateful_set(self.namespace, name).await,
            None => self.gateway.get_stateful_set(self.namespace, name).await,
        };
        self.absent_if_missing("StatefulSet", result)
    }

    async fn jobs(&self, target: Option<&WorkloadKind>) -> Result<Vec<Job>, GatewayError> {
        if !self.included(&WorkloadKind::Job, target).await {
            return Ok(Vec::new());
        }
        let result = self.gateway.list_jobs(self.namespace).await;
        self.report("Job", result)
    }

    async fn cron_jobs(&self, target: Option<&WorkloadKind>) -> Result<Vec<CronJob>, GatewayError> {
        if !self.included(&WorkloadKind::CronJob, target).await {
            return Ok(Vec::new());
        }
        let result = self.gateway.list_cron_jobs(self.namespace).await;
        self.report("CronJob", result)
    }

    /// Services of the namespace, through the cache when it serves the namespace
    pub async fn services(&self) -> Result<Vec<Service>, GatewayError> {
        let result = match self.cached() {
            Some(cache) => cache.list_services(self.namespace).await,
            None => self.gateway.list_services(self.namespace).await,
        };
        self.report("Service", result)
    }

    /// Everything needed to list the workloads of the namespace
    pub async fn fetch_all(&self, selector: &LabelSelector) -> Result<Resources, GatewayError> {
        self.gateway.check_namespace(self.namespace).await?;

        let (
            pods,
            deployments,
            replica_sets,
            replication_controllers,
            deployment_configs,
            stateful_sets,
            cron_jobs,
            jobs,
        ) = tokio::join!(
            self.pods(selector),
            self.deployments(),
            self.replica_sets(None),
            self.replication_controllers(None),
            self.deployment_configs(),
            self.stateful_sets(),
            self.cron_jobs(None),
            self.jobs(None),
        );

        Ok(Resources {
            pods: pods?,
            deployments: deployments?,
            replica_sets: replica_sets?,
            replication_controllers: replication_controllers?,
            deployment_configs: deployment_configs?,
            stateful_sets: stateful_sets?,
            jobs: jobs?,
            cron_jobs: cron_jobs?,
        })
    }

    /// Everything needed to resolve one named workload. Kinds other than
    /// `target` are skipped when a target kind is given.
    pub async fn fetch_one(
        &self,
        name: &str,
        target: Option<&WorkloadKind>,
    ) -> Result<Resources, GatewayError> {
        self.gateway.check_namespace(self.namespace).await?;

        let everything = LabelSelector::everything();
        let (
            pods,
            deployments,
            replica_sets,
            replication_controllers,
            deployment_configs,
            stateful_sets,
            cron_jobs,
            jobs,
        ) = tokio::join!(
            self.pods(&everything),
            self.deployment(name, target),
            self.replica_sets(target),
            self.replication_controllers(target),
            self.deployment_config(name, target),
            self.stateful_set(name, target),
            self.cron_jobs(target),
            self.jobs(target),
        );

        Ok(Resources {
            pods: pods?,
            deployments: deployments?,
            replica_sets: replica_sets?,
            replication_controllers: replication_controllers?,
            deployment_configs: deployment_configs?,
            stateful_sets: stateful_sets?,
            jobs: jobs?,
            cron_jobs: cron_jobs?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use workscope_k8s::fake::{FakeGateway, fixtures};
    use workscope_k8s::{CacheConfig, SnapshotCache};

    fn fetcher<'a>(gateway: &'a FakeGateway, config: &'a WorkloadConfig) -> Fetcher<'a> {
        Fetcher {
            gateway,
            cache: None,
            config,
            namespace: "bookinfo",
        }
    }

    #[tokio::test]
    async fn test_forbidden_namespace_issues_no_fetches() {
        let gateway = FakeGateway::new().forbid_namespace("bookinfo");
        let config = WorkloadConfig::default();

        let err = fetcher(&gateway, &config)
            .fetch_all(&LabelSelector::everything())
            .await
            .unwrap_err();

        assert!(err.is_forbidden());
        assert_eq!(gateway.calls(), vec!["check_namespace".to_string()]);
    }

    #[tokio::test]
    async fn test_excluded_and_unsupported_kinds_are_skipped() {
        let gateway = FakeGateway::new();
        let config = WorkloadConfig {
            excluded_workloads: vec![WorkloadKind::CronJob],
            ..Default::default()
        };

        fetcher(&gateway, &config)
            .fetch_all(&LabelSelector::everything())
            .await
            .unwrap();

        assert_eq!(gateway.call_count("list_cron_jobs"), 0);
        assert_eq!(gateway.call_count("list_deployment_configs"), 0);
        assert_eq!(gateway.call_count("list_jobs"), 1);
    }

    #[tokio::test]
    async fn test_openshift_enables_deployment_configs() {
        let gateway = FakeGateway::new().with_openshift();
        let config = WorkloadConfig::default();

        fetcher(&gateway, &config)
            .fetch_all(&LabelSelector::everything())
            .await
            .unwrap();

        assert_eq!(gateway.call_count("list_deployment_configs"), 1);
    }

    #[tokio::test]
    async fn test_any_failed_task_fails_the_fetch_after_all_ran() {
        let gateway = FakeGateway::new().fail("list_jobs", "connection reset");
        let config = WorkloadConfig::default();

        let err = fetcher(&gateway, &config)
            .fetch_all(&LabelSelector::everything())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("connection reset"));
        assert_eq!(gateway.call_count("list_pods"), 1);
        assert_eq!(gateway.call_count("list_cron_jobs"), 1);
    }

    #[tokio::test]
    async fn test_single_fetch_treats_missing_objects_as_absent() {
        let gateway = FakeGateway::new()
            .with_openshift()
            .with_deployments(vec![fixtures::deployment("bookinfo", "reviews-v1", &[], 1)]);
        let config = WorkloadConfig::default();

        let resources = fetcher(&gateway, &config)
            .fetch_one("reviews-v1", None)
            .await
            .unwrap();

        assert_eq!(resources.deployments.len(), 1);
        assert!(resources.stateful_sets.is_empty());
        assert!(resources.deployment_configs.is_empty());
    }

    #[tokio::test]
    async fn test_single_fetch_surfaces_other_errors() {
        let gateway = FakeGateway::new().fail("get_stateful_set", "timeout");
        let config = WorkloadConfig::default();

        let err = fetcher(&gateway, &config)
            .fetch_one("mongo", None)
            .await
            .unwrap_err();
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_target_kind_skips_other_kinds() {
        let gateway = FakeGateway::new();
        let config = WorkloadConfig::default();

        fetcher(&gateway, &config)
            .fetch_one("reviews-v1", Some(&WorkloadKind::Deployment))
            .await
            .unwrap();

        assert_eq!(gateway.call_count("get_deployment"), 1);
        assert_eq!(gateway.call_count("list_pods"), 1);
        assert_eq!(gateway.call_count("list_replica_sets"), 0);
        assert_eq!(gateway.call_count("list_jobs"), 0);
        assert_eq!(gateway.call_count("get_stateful_set"), 0);
    }

    #[tokio::test]
    async fn test_cache_eligible_reads_go_through_cache() {
        let gateway = Arc::new(FakeGateway::new());
        let cache = SnapshotCache::new(
            gateway.clone(),
            CacheConfig {
                enabled: true,
                namespaces: vec!["bookinfo".to_string()],
                ttl_secs: 60,
            },
        );
        let config = WorkloadConfig::default();
        let fetcher = Fetcher {
            gateway: gateway.as_ref(),
            cache: Some(&cache),
            config: &config,
            namespace: "bookinfo",
        };

        fetcher.fetch_all(&LabelSelector::everything()).await.unwrap();
        fetcher.fetch_all(&LabelSelector::everything()).await.unwrap();

        // Snapshot loaded once, uncached kinds read every time
        assert_eq!(gateway.call_count("list_deployments"), 1);
        assert_eq!(gateway.call_count("list_jobs"), 2);
    }
}
