use std::sync::Arc;

use tracing::{debug, info};
use workscope_k8s::{ClusterGateway, NamespaceCache};
use workscope_types::{LabelSelector, PodInfo, Workload, WorkloadKind};

use crate::builder::{Builder, matching_services, pod_info};
use crate::fetch::Fetcher;
use crate::proxy::{Degraded, NoProxyStatus, ProxyStatusSource, enrich};
use crate::{WorkloadConfig, WorkloadError, resolver, update};

/// Entry point for listing, looking up and patching workloads
pub struct WorkloadService {
    gateway: Arc<dyn ClusterGateway>,
    cache: Option<Arc<dyn NamespaceCache>>,
    proxy_status: Arc<dyn ProxyStatusSource>,
    config: WorkloadConfig,
}

impl WorkloadService {
    pub fn new(gateway: Arc<dyn ClusterGateway>, config: WorkloadConfig) -> Self {
        Self {
            gateway,
            cache: None,
            proxy_status: Arc::new(NoProxyStatus),
            config,
        }
    }

    /// Serve cache-eligible namespaces through `cache`
    pub fn with_cache(mut self, cache: Arc<dyn NamespaceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_proxy_status(mut self, source: Arc<dyn ProxyStatusSource>) -> Self {
        self.proxy_status = source;
        self
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    fn fetcher<'a>(&'a self, namespace: &'a str) -> Fetcher<'a> {
        Fetcher {
            gateway: self.gateway.as_ref(),
            cache: self.cache.as_deref(),
            config: &self.config,
            namespace,
        }
    }

    /// All workloads of the namespace, ordered by name
    pub async fn list_workloads(&self, namespace: &str) -> Result<Vec<Workload>, WorkloadError> {
        self.list_matching(namespace, &LabelSelector::everything())
            .await
    }

    /// Workloads whose pods match `selector`, plus idle controllers whose
    /// template matches it
    pub async fn list_workloads_by_selector(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Workload>, WorkloadError> {
        let selector = LabelSelector::parse(selector)?;
        self.list_matching(namespace, &selector).await
    }

    async fn list_matching(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<Workload>, WorkloadError> {
        let resources = self.fetcher(namespace).fetch_all(selector).await?;
        let registry = resolver::resolve(&resources, selector);

        let builder = Builder {
            resources: &resources,
            config: &self.config,
            namespace,
        };

        let mut workloads = Vec::with_capacity(registry.len());
        for (name, kind) in &registry {
            // A controller gone since resolution is dropped from listings
            let Some(mut workload) = builder.build(name, kind) else {
                continue;
            };
            enrich(self.proxy_status.as_ref(), &mut workload, Degraded::Empty).await;
            workloads.push(workload);
        }

        debug!(namespace, count = workloads.len(), "listed workloads");
        Ok(workloads)
    }

    /// One workload by name. `kind` narrows which controller kinds are read.
    pub async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
        kind: Option<&WorkloadKind>,
        include_services: bool,
    ) -> Result<Workload, WorkloadError> {
        let fetcher = self.fetcher(namespace);
        let resources = fetcher.fetch_one(name, kind).await?;
        let registry = resolver::resolve(&resources, &LabelSelector::everything());

        let resolved = registry
            .get(name)
            .ok_or_else(|| WorkloadError::not_found(namespace, name))?;

        let builder = Builder {
            resources: &resources,
            config: &self.config,
            namespace,
        };
        let mut workload = builder
            .build(name, resolved)
            .ok_or_else(|| WorkloadError::not_found(namespace, name))?;

        enrich(self.proxy_status.as_ref(), &mut workload, Degraded::Absent).await;

        if include_services {
            let services = fetcher.services().await?;
            workload.set_services(matching_services(&services, &workload.labels));
        }

        Ok(workload)
    }

    /// Value of the app label on the named workload, if it carries one
    pub async fn get_workload_app_name(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<String>, WorkloadError> {
        let workload = self.get_workload(namespace, name, None, false).await?;
        Ok(workload.labels.get(&self.config.app_label_name).cloned())
    }

    /// Pods of the namespace matching `selector`; an empty selector matches all
    pub async fn list_pods(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<PodInfo>, WorkloadError> {
        let selector = LabelSelector::parse(selector)?;
        let fetcher = self.fetcher(namespace);
        self.gateway.check_namespace(namespace).await?;

        let pods = fetcher.pods(&selector).await?;
        Ok(pods
            .iter()
            .map(|pod| pod_info(pod, &self.config.sidecar_annotation))
            .collect())
    }

    pub async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodInfo, WorkloadError> {
        let pod = self.gateway.get_pod(namespace, name).await?;
        Ok(pod_info(&pod, &self.config.sidecar_annotation))
    }

    /// Apply a JSON merge patch to the named workload and return its fresh state
    pub async fn update_workload(
        &self,
        namespace: &str,
        name: &str,
        kind: Option<&WorkloadKind>,
        include_services: bool,
        patch: &str,
    ) -> Result<Workload, WorkloadError> {
        let patch = update::parse_patch(patch)?;
        update::patch_workload(
            self.gateway.as_ref(),
            &self.config,
            namespace,
            name,
            kind,
            &patch,
        )
        .await?;

        if let Some(cache) = &self.cache {
            cache.refresh_namespace(namespace).await;
        }
        info!(namespace, name, "workload updated");

        self.get_workload(namespace, name, kind, include_services)
            .await
    }
}
