use std::fmt::Debug;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Namespace, Pod, ReplicationController, Service};
use kube::api::{DynamicObject, ListParams, LogParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use workscope_types::{LabelSelector, WorkloadKind};

use crate::deployment_config::DEPLOYMENT_CONFIG_GROUP;
use crate::{
    ClusterGateway, DeploymentConfig, GatewayError, PodLogRequest, deployment_config_resource,
};

/// Cluster gateway backed by a live API server connection
pub struct KubeGateway {
    client: kube::Client,
    context: Option<String>,
    default_namespace: String,
    openshift: OnceCell<bool>,
}

impl KubeGateway {
    /// Connect using the kubeconfig, optionally selecting a context other than the current one
    pub async fn connect(context: Option<&str>, read_timeout: Option<Duration>) -> Result<Self> {
        let kubeconfig =
            Kubeconfig::read().context("Failed to read kubeconfig. Is kubectl configured?")?;

        let context = context
            .map(str::to_string)
            .or_else(|| kubeconfig.current_context.clone());

        let mut config = kube::Config::from_custom_kubeconfig(
            kubeconfig,
            &KubeConfigOptions {
                context: context.clone(),
                ..Default::default()
            },
        )
        .await
        .context(format!(
            "Failed to create config for context: {}",
            context.as_deref().unwrap_or("<current>")
        ))?;

        if read_timeout.is_some() {
            config.read_timeout = read_timeout;
        }
        let default_namespace = config.default_namespace.clone();

        let client = kube::Client::try_from(config).context(format!(
            "Failed to create client for context: {}",
            context.as_deref().unwrap_or("<current>")
        ))?;

        debug!(
            context = context.as_deref().unwrap_or("<current>"),
            namespace = %default_namespace,
            "connected to cluster"
        );

        Ok(Self::from_client(client, context, default_namespace))
    }

    pub fn from_client(
        client: kube::Client,
        context: Option<String>,
        default_namespace: String,
    ) -> Self {
        Self {
            client,
            context,
            default_namespace,
            openshift: OnceCell::new(),
        }
    }

    pub fn context_name(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Namespace of the selected kubeconfig context, "default" when it names none
    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    /// Whether the cluster serves the OpenShift apps API group. Probed once.
    async fn is_openshift(&self) -> bool {
        *self
            .openshift
            .get_or_init(|| async {
                match self.client.list_api_groups().await {
                    Ok(groups) => groups
                        .groups
                        .iter()
                        .any(|g| g.name == DEPLOYMENT_CONFIG_GROUP),
                    Err(e) => {
                        warn!(error = %e, "failed to probe API groups, assuming plain Kubernetes");
                        false
                    }
                }
            })
            .await
    }

    async fn list<K>(&self, namespace: &str, params: &ListParams) -> Result<Vec<K>, GatewayError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(params).await?;
        Ok(list.items)
    }

    async fn get<K>(&self, namespace: &str, name: &str) -> Result<K, GatewayError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn patch<K>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), GatewayError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    fn deployment_configs(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &deployment_config_resource())
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn check_namespace(&self, namespace: &str) -> Result<(), GatewayError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        namespaces.get(namespace).await?;
        Ok(())
    }

    async fn supports_kind(&self, kind: &WorkloadKind) -> bool {
        match kind {
            WorkloadKind::DeploymentConfig => self.is_openshift().await,
            _ => true,
        }
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<Pod>, GatewayError> {
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(&selector.to_string());
        }
        self.list(namespace, &params).await
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, GatewayError> {
        self.get(namespace, name).await
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, GatewayError> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Deployment, GatewayError> {
        self.get(namespace, name).await
    }

    async fn list_replica_sets(&self, namespace: &str) -> Result<Vec<ReplicaSet>, GatewayError> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn list_replication_controllers(
        &self,
        namespace: &str,
    ) -> Result<Vec<ReplicationController>, GatewayError> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn list_deployment_configs(
        &self,
        namespace: &str,
    ) -> Result<Vec<DeploymentConfig>, GatewayError> {
        let list = self
            .deployment_configs(namespace)
            .list(&ListParams::default())
            .await?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|obj| match DeploymentConfig::try_from(obj) {
                Ok(dc) => Some(dc),
                Err(e) => {
                    warn!(namespace, error = %e, "skipping unreadable DeploymentConfig");
                    None
                }
            })
            .collect())
    }

    async fn get_deployment_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<DeploymentConfig, GatewayError> {
        let obj = self.deployment_configs(namespace).get(name).await?;
        DeploymentConfig::try_from(obj)
    }

    async fn list_stateful_sets(&self, namespace: &str) -> Result<Vec<StatefulSet>, GatewayError> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSet, GatewayError> {
        self.get(namespace, name).await
    }

    async fn list_jobs(&self, namespace: &str) -> Result<Vec<Job>, GatewayError> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn list_cron_jobs(&self, namespace: &str) -> Result<Vec<CronJob>, GatewayError> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>, GatewayError> {
        self.list(namespace, &ListParams::default()).await
    }

    async fn patch_workload(
        &self,
        namespace: &str,
        name: &str,
        kind: &WorkloadKind,
        patch: &serde_json::Value,
    ) -> Result<(), GatewayError> {
        debug!(namespace, name, %kind, "patching workload object");
        match kind {
            WorkloadKind::Deployment => self.patch::<Deployment>(namespace, name, patch).await,
            WorkloadKind::ReplicaSet => self.patch::<ReplicaSet>(namespace, name, patch).await,
            WorkloadKind::ReplicationController => {
                self.patch::<ReplicationController>(namespace, name, patch)
                    .await
            }
            WorkloadKind::StatefulSet => self.patch::<StatefulSet>(namespace, name, patch).await,
            WorkloadKind::Job => self.patch::<Job>(namespace, name, patch).await,
            WorkloadKind::CronJob => self.patch::<CronJob>(namespace, name, patch).await,
            WorkloadKind::Pod => self.patch::<Pod>(namespace, name, patch).await,
            WorkloadKind::DeploymentConfig => {
                self.deployment_configs(namespace)
                    .patch(name, &PatchParams::default(), &Patch::Merge(patch))
                    .await?;
                Ok(())
            }
            WorkloadKind::Other(other) => Err(GatewayError::Unavailable(format!(
                "patching {} objects is not supported",
                other
            ))),
        }
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        request: &PodLogRequest,
    ) -> Result<String, GatewayError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: request.container.clone(),
            since_time: request.since_time,
            tail_lines: request.tail_lines,
            timestamps: request.timestamps,
            ..Default::default()
        };
        Ok(pods.logs(pod, &params).await?)
    }
}
