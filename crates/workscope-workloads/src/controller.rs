use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::ReplicationController;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use workscope_k8s::DeploymentConfig;
use workscope_types::{ReplicaCounts, WorkloadKind};

/// A controller object that stamps out pods from a template
pub(crate) trait PodTemplateOwner {
    fn kind() -> WorkloadKind;

    fn metadata(&self) -> &ObjectMeta;

    /// Labels of the pod template, used as the pod selector
    fn template_labels(&self) -> Option<&BTreeMap<String, String>>;

    fn replicas(&self) -> ReplicaCounts;

    fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }
}

impl PodTemplateOwner for Deployment {
    fn kind() -> WorkloadKind {
        WorkloadKind::Deployment
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn template_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.spec.as_ref()?.template.metadata.as_ref()?.labels.as_ref()
    }

    fn replicas(&self) -> ReplicaCounts {
        let status = self.status.as_ref();
        ReplicaCounts {
            desired: self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0),
            current: status.and_then(|s| s.replicas).unwrap_or(0),
            available: status.and_then(|s| s.available_replicas).unwrap_or(0),
        }
    }
}

impl PodTemplateOwner for ReplicaSet {
    fn kind() -> WorkloadKind {
        WorkloadKind::ReplicaSet
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn template_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.spec
            .as_ref()?
            .template
            .as_ref()?
            .metadata
            .as_ref()?
            .labels
            .as_ref()
    }

    fn replicas(&self) -> ReplicaCounts {
        let status = self.status.as_ref();
        ReplicaCounts {
            desired: self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0),
            current: status.map(|s| s.replicas).unwrap_or(0),
            available: status.and_then(|s| s.available_replicas).unwrap_or(0),
        }
    }
}

impl PodTemplateOwner for ReplicationController {
    fn kind() -> WorkloadKind {
        WorkloadKind::ReplicationController
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn template_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.spec
            .as_ref()?
            .template
            .as_ref()?
            .metadata
            .as_ref()?
            .labels
            .as_ref()
    }

    fn replicas(&self) -> ReplicaCounts {
        let status = self.status.as_ref();
        ReplicaCounts {
            desired: self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0),
            current: status.map(|s| s.replicas).unwrap_or(0),
            available: status.and_then(|s| s.available_replicas).unwrap_or(0),
        }
    }
}

impl PodTemplateOwner for DeploymentConfig {
    fn kind() -> WorkloadKind {
        WorkloadKind::DeploymentConfig
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn template_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.spec
            .template
            .as_ref()?
            .metadata
            .as_ref()?
            .labels
            .as_ref()
    }

    fn replicas(&self) -> ReplicaCounts {
        ReplicaCounts {
            desired: self.spec.replicas.unwrap_or(0),
            current: self.status.replicas,
            available: self.status.available_replicas,
        }
    }
}

impl PodTemplateOwner for StatefulSet {
    fn kind() -> WorkloadKind {
        WorkloadKind::StatefulSet
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn template_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.spec.as_ref()?.template.metadata.as_ref()?.labels.as_ref()
    }

    fn replicas(&self) -> ReplicaCounts {
        let status = self.status.as_ref();
        ReplicaCounts {
            desired: self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0),
            current: status.map(|s| s.replicas).unwrap_or(0),
            available: status.and_then(|s| s.available_replicas).unwrap_or(0),
        }
    }
}

impl PodTemplateOwner for Job {
    fn kind() -> WorkloadKind {
        WorkloadKind::Job
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn template_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.spec.as_ref()?.template.metadata.as_ref()?.labels.as_ref()
    }

    // Jobs report completions rather than replicas
    fn replicas(&self) -> ReplicaCounts {
        let status = self.status.as_ref();
        ReplicaCounts {
            desired: self.spec.as_ref().and_then(|s| s.completions).unwrap_or(1),
            current: status.and_then(|s| s.active).unwrap_or(0),
            available: status.and_then(|s| s.succeeded).unwrap_or(0),
        }
    }
}

impl PodTemplateOwner for CronJob {
    fn kind() -> WorkloadKind {
        WorkloadKind::CronJob
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn template_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.spec
            .as_ref()?
            .job_template
            .spec
            .as_ref()?
            .template
            .metadata
            .as_ref()?
            .labels
            .as_ref()
    }

    fn replicas(&self) -> ReplicaCounts {
        let active = self
            .status
            .as_ref()
            .and_then(|s| s.active.as_ref())
            .map(|a| a.len() as i32)
            .unwrap_or(0);
        ReplicaCounts {
            desired: 0,
            current: active,
            available: active,
        }
    }
}

/// Owner references flagged as the managing controller
pub(crate) fn controller_refs(meta: &ObjectMeta) -> impl Iterator<Item = &OwnerReference> {
    meta.owner_references
        .iter()
        .flatten()
        .filter(|r| r.controller == Some(true))
}

pub(crate) fn has_owner_refs(meta: &ObjectMeta) -> bool {
    meta.owner_references
        .as_ref()
        .is_some_and(|refs| !refs.is_empty())
}

pub(crate) fn find_by_name<'a, C: PodTemplateOwner>(items: &'a [C], name: &str) -> Option<&'a C> {
    items.iter().find(|c| c.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use workscope_k8s::fake::fixtures;

    #[test]
    fn test_template_labels_per_kind() {
        let deployment = fixtures::deployment("ns", "web", &[("app", "web")], 2);
        assert_eq!(
            deployment.template_labels().and_then(|l| l.get("app")).map(String::as_str),
            Some("web")
        );

        let cron_job = fixtures::cron_job("ns", "backup", &[("app", "backup")]);
        assert_eq!(
            cron_job.template_labels().and_then(|l| l.get("app")).map(String::as_str),
            Some("backup")
        );

        let dc = fixtures::deployment_config("ns", "legacy", &[("app", "legacy")], 1);
        assert!(dc.template_labels().is_some());
        assert_eq!(DeploymentConfig::kind(), WorkloadKind::DeploymentConfig);
    }

    #[test]
    fn test_replica_counts() {
        let deployment = fixtures::deployment("ns", "web", &[("app", "web")], 3);
        assert_eq!(
            deployment.replicas(),
            ReplicaCounts {
                desired: 3,
                current: 3,
                available: 3
            }
        );
    }

    #[test]
    fn test_controller_refs_skip_plain_owners() {
        let pod = fixtures::uncontrolled_pod("ns", "p", &[], &[("ReplicaSet", "rs")]);
        assert!(has_owner_refs(&pod.metadata));
        assert_eq!(controller_refs(&pod.metadata).count(), 0);

        let pod = fixtures::pod("ns", "p", &[], &[("ReplicaSet", "rs")]);
        assert_eq!(controller_refs(&pod.metadata).count(), 1);
    }
}
