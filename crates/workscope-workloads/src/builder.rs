//! Turns resolved registry entries into workloads with their pods

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Pod, Service};
use tracing::{error, warn};
use workscope_types::{
    ContainerInfo, LabelSelector, OwnerRef, PodInfo, PodStatus, ServiceInfo, ServicePortInfo,
    Workload, WorkloadKind,
};

use crate::WorkloadConfig;
use crate::controller::{PodTemplateOwner, find_by_name};
use crate::fetch::Resources;

/// Convert a k8s Pod to PodInfo
pub(crate) fn pod_info(pod: &Pod, sidecar_annotation: &str) -> PodInfo {
    let meta = &pod.metadata;
    let mut info = PodInfo::new(
        meta.name.clone().unwrap_or_default(),
        meta.namespace.clone().unwrap_or_default(),
    );

    info.labels = meta.labels.clone().unwrap_or_default();
    info.created_at = meta.creation_timestamp.as_ref().map(|t| t.0);
    info.created_by = meta
        .owner_references
        .iter()
        .flatten()
        .map(|r| OwnerRef {
            name: r.name.clone(),
            kind: WorkloadKind::from(r.kind.as_str()),
            controller: r.controller.unwrap_or(false),
        })
        .collect();
    info.has_sidecar = meta
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(sidecar_annotation));

    if let Some(spec) = &pod.spec {
        info.node_name = spec.node_name.clone();
    }

    if let Some(status) = &pod.status {
        info.pod_ip = status.pod_ip.clone();
        info.status = status
            .phase
            .as_deref()
            .map(PodStatus::from)
            .unwrap_or(PodStatus::Unknown);

        if let Some(container_statuses) = &status.container_statuses {
            info.containers = container_statuses
                .iter()
                .map(|cs| {
                    let mut container = ContainerInfo::new(cs.name.clone());
                    container.image = Some(cs.image.clone());
                    container.ready = cs.ready;
                    container.restart_count = cs.restart_count;
                    container
                })
                .collect();
        }
    }

    info
}

pub(crate) fn service_info(service: &Service) -> ServiceInfo {
    let spec = service.spec.as_ref();
    ServiceInfo {
        name: service.metadata.name.clone().unwrap_or_default(),
        namespace: service.metadata.namespace.clone().unwrap_or_default(),
        selector: spec.and_then(|s| s.selector.clone()).unwrap_or_default(),
        service_type: spec.and_then(|s| s.type_.clone()),
        cluster_ip: spec.and_then(|s| s.cluster_ip.clone()),
        ports: spec
            .and_then(|s| s.ports.as_ref())
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| ServicePortInfo {
                        name: p.name.clone(),
                        port: p.port,
                        protocol: p.protocol.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Services whose non-empty selector matches the workload labels
pub(crate) fn matching_services(services: &[Service], labels: &BTreeMap<String, String>) -> Vec<ServiceInfo> {
    services
        .iter()
        .map(service_info)
        .filter(|svc| !svc.selector.is_empty())
        .filter(|svc| LabelSelector::from_labels(&svc.selector).matches(labels))
        .collect()
}

pub(crate) struct Builder<'a> {
    pub resources: &'a Resources,
    pub config: &'a WorkloadConfig,
    pub namespace: &'a str,
}

impl Builder<'_> {
    fn pods_matching(&self, selector: &LabelSelector) -> Vec<PodInfo> {
        let empty = BTreeMap::new();
        self.resources
            .pods
            .iter()
            .filter(|pod| selector.matches(pod.metadata.labels.as_ref().unwrap_or(&empty)))
            .map(|pod| pod_info(pod, &self.config.sidecar_annotation))
            .collect()
    }

    fn from_controller<C: PodTemplateOwner>(&self, items: &[C], name: &str) -> Option<Workload> {
        let Some(controller) = find_by_name(items, name) else {
            if C::kind() == WorkloadKind::CronJob {
                warn!(
                    namespace = self.namespace,
                    name, "workload is not found as CronJob, its Jobs may have outlived it"
                );
            } else {
                error!(namespace = self.namespace, name, kind = %C::kind(), "workload is not found");
            }
            return None;
        };

        let labels = controller.template_labels().cloned().unwrap_or_default();
        let meta = controller.metadata();

        let mut workload = Workload::new(name.to_string(), self.namespace.to_string(), C::kind());
        workload.set_pods(self.pods_matching(&LabelSelector::from_labels(&labels)));
        workload.labels = labels;
        workload.created_at = meta.creation_timestamp.as_ref().map(|t| t.0);
        workload.resource_version = meta.resource_version.clone();
        workload.replicas = controller.replicas();
        Some(workload)
    }

    fn from_pod(&self, name: &str) -> Option<Workload> {
        let Some(pod) = self
            .resources
            .pods
            .iter()
            .find(|p| p.metadata.name.as_deref() == Some(name))
        else {
            error!(namespace = self.namespace, name, "workload is not found as Pod");
            return None;
        };

        let mut workload =
            Workload::new(name.to_string(), self.namespace.to_string(), WorkloadKind::Pod);
        workload.labels = pod.metadata.labels.clone().unwrap_or_default();
        workload.created_at = pod.metadata.creation_timestamp.as_ref().map(|t| t.0);
        workload.resource_version = pod.metadata.resource_version.clone();
        workload.replicas.desired = 1;
        workload.replicas.current = 1;
        workload.replicas.available = i32::from(
            pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running"),
        );
        workload.set_pods(vec![pod_info(pod, &self.config.sidecar_annotation)]);
        Some(workload)
    }

    /// Kinds not modelled natively own their pods through owner references only
    fn from_owner(&self, name: &str, kind: &WorkloadKind) -> Workload {
        let pods: Vec<&Pod> = self
            .resources
            .pods
            .iter()
            .filter(|pod| {
                pod.metadata
                    .owner_references
                    .iter()
                    .flatten()
                    .any(|r| r.name == name && r.kind == kind.as_str())
            })
            .collect();

        let mut workload = Workload::new(name.to_string(), self.namespace.to_string(), kind.clone());
        if let Some(first) = pods.first() {
            workload.labels = first.metadata.labels.clone().unwrap_or_default();
            workload.created_at = first.metadata.creation_timestamp.as_ref().map(|t| t.0);
        }
        let count = pods.len() as i32;
        workload.replicas.desired = count;
        workload.replicas.current = count;
        workload.set_pods(
            pods.into_iter()
                .map(|pod| pod_info(pod, &self.config.sidecar_annotation))
                .collect(),
        );
        workload.replicas.available = workload
            .pods
            .iter()
            .filter(|p| p.status == PodStatus::Running)
            .count() as i32;
        workload
    }

    /// Build the workload for a registry entry; `None` when its controller vanished
    pub fn build(&self, name: &str, kind: &WorkloadKind) -> Option<Workload> {
        let resources = self.resources;
        match kind {
            WorkloadKind::Deployment => self.from_controller(&resources.deployments, name),
            WorkloadKind::ReplicaSet => self.from_controller(&resources.replica_sets, name),
            WorkloadKind::ReplicationController => {
                self.from_controller(&resources.replication_controllers, name)
            }
            WorkloadKind::DeploymentConfig => {
                self.from_controller(&resources.deployment_configs, name)
            }
            WorkloadKind::StatefulSet => self.from_controller(&resources.stateful_sets, name),
            WorkloadKind::Job => self.from_controller(&resources.jobs, name),
            WorkloadKind::CronJob => self.from_controller(&resources.cron_jobs, name),
            WorkloadKind::Pod => self.from_pod(name),
            WorkloadKind::Other(_) => Some(self.from_owner(name, kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workscope_k8s::fake::fixtures;

    const NS: &str = "bookinfo";

    fn build(resources: &Resources, name: &str, kind: WorkloadKind) -> Option<Workload> {
        let config = WorkloadConfig::default();
        Builder {
            resources,
            config: &config,
            namespace: NS,
        }
        .build(name, &kind)
    }

    #[test]
    fn test_deployment_selects_its_pods_regardless_of_order() {
        let labels = [("app", "reviews"), ("version", "v1")];
        let resources = Resources {
            pods: vec![
                fixtures::pod(NS, "reviews-v2-1", &[("app", "reviews"), ("version", "v2")], &[]),
                fixtures::pod(NS, "reviews-v1-b", &labels, &[]),
                fixtures::pod(NS, "ratings-1", &[("app", "ratings")], &[]),
                fixtures::pod(NS, "reviews-v1-a", &labels, &[]),
            ],
            deployments: vec![fixtures::deployment(NS, "reviews-v1", &labels, 2)],
            ..Default::default()
        };

        let workload = build(&resources, "reviews-v1", WorkloadKind::Deployment).unwrap();
        let mut names = workload.pod_names();
        names.sort();
        assert_eq!(names, vec!["reviews-v1-a", "reviews-v1-b"]);
        assert_eq!(workload.pod_count, 2);
        assert_eq!(workload.replicas.desired, 2);
        assert_eq!(workload.resource_version.as_deref(), Some("1001"));
        assert_eq!(workload.labels.get("version").map(String::as_str), Some("v1"));
    }

    #[test]
    fn test_cron_job_uses_job_template_labels() {
        let labels = [("app", "backup")];
        let resources = Resources {
            pods: vec![
                fixtures::pod(NS, "backup-1-x", &labels, &[("Job", "backup-1")]),
                fixtures::pod(NS, "other", &[("app", "other")], &[]),
            ],
            cron_jobs: vec![fixtures::cron_job(NS, "backup", &labels)],
            ..Default::default()
        };

        let workload = build(&resources, "backup", WorkloadKind::CronJob).unwrap();
        assert_eq!(workload.pod_names(), vec!["backup-1-x"]);
    }

    #[test]
    fn test_pod_workload_is_the_single_pod() {
        let resources = Resources {
            pods: vec![
                fixtures::pod(NS, "debug", &[("run", "debug")], &[]),
                fixtures::pod(NS, "debug-2", &[("run", "debug")], &[]),
            ],
            ..Default::default()
        };

        let workload = build(&resources, "debug", WorkloadKind::Pod).unwrap();
        assert_eq!(workload.pod_names(), vec!["debug"]);
        assert_eq!(workload.labels.get("run").map(String::as_str), Some("debug"));
    }

    #[test]
    fn test_generic_kind_matches_by_owner_reference() {
        let resources = Resources {
            pods: vec![
                fixtures::pod(NS, "fluentd-a", &[("app", "logs")], &[("DaemonSet", "fluentd")]),
                fixtures::pod(NS, "fluentd-b", &[("app", "logs")], &[("DaemonSet", "fluentd")]),
                fixtures::pod(NS, "lookalike", &[("app", "logs")], &[("ReplicaSet", "fluentd")]),
            ],
            ..Default::default()
        };

        let workload =
            build(&resources, "fluentd", WorkloadKind::Other("DaemonSet".to_string())).unwrap();
        assert_eq!(workload.pod_names(), vec!["fluentd-a", "fluentd-b"]);
        assert_eq!(workload.replicas.available, 2);
    }

    #[test]
    fn test_missing_controller_builds_nothing() {
        let resources = Resources::default();
        assert!(build(&resources, "gone", WorkloadKind::Deployment).is_none());
        assert!(build(&resources, "gone", WorkloadKind::CronJob).is_none());
        assert!(build(&resources, "gone", WorkloadKind::Pod).is_none());
    }

    #[test]
    fn test_pod_conversion() {
        let pod = fixtures::sidecar_pod(NS, "reviews-1", &[("app", "reviews")], &[("ReplicaSet", "rs")]);
        let info = pod_info(&pod, fixtures::SIDECAR_ANNOTATION);

        assert!(info.has_sidecar);
        assert_eq!(info.status, PodStatus::Running);
        assert_eq!(info.node_name.as_deref(), Some("node-1"));
        assert_eq!(info.containers.len(), 1);
        assert!(info.containers[0].ready);
        assert_eq!(
            info.created_by,
            vec![OwnerRef {
                name: "rs".to_string(),
                kind: WorkloadKind::ReplicaSet,
                controller: true,
            }]
        );
    }

    #[test]
    fn test_services_need_a_matching_selector() {
        let services = vec![
            fixtures::service(NS, "reviews", &[("app", "reviews")]),
            fixtures::service(NS, "ratings", &[("app", "ratings")]),
            fixtures::service(NS, "headless", &[]),
        ];
        let labels = BTreeMap::from([
            ("app".to_string(), "reviews".to_string()),
            ("version".to_string(), "v1".to_string()),
        ]);

        let matched = matching_services(&services, &labels);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "reviews");
        assert_eq!(matched[0].ports[0].port, 9080);
    }
}
