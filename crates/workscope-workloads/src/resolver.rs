//! Controller graph resolution
//!
//! Maps every pod onto the top-level controller that owns it:
//!
//! 1. seed the registry from pod owner references (bare pods become `Pod`);
//! 2. collapse ReplicaSets, ReplicationControllers and Jobs into their
//!    parents (Jobs only when their CronJob still exists);
//! 3. add controllers that currently own no pods.
//!
//! Conflicting kind claims for the same name are settled by
//! [`controller_priority`].

use std::cmp::Ordering;
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::error;
use workscope_types::{LabelSelector, WorkloadKind};

use crate::controller::{PodTemplateOwner, controller_refs, has_owner_refs};
use crate::fetch::Resources;

/// Controller name to resolved kind, iterated in name order
pub(crate) type Registry = BTreeMap<String, WorkloadKind>;

fn rank(kind: &WorkloadKind) -> i32 {
    kind.precedence().unwrap_or_else(|| {
        error!(%kind, "controller kind assigned to a pod is not ranked");
        i32::MIN
    })
}

/// Pick the kind that wins when two owner references name the same
/// controller with different kinds. Ties keep `current`.
pub fn controller_priority(current: &WorkloadKind, claimed: &WorkloadKind) -> WorkloadKind {
    match rank(current).cmp(&rank(claimed)) {
        Ordering::Less => claimed.clone(),
        Ordering::Equal | Ordering::Greater => current.clone(),
    }
}

fn record(registry: &mut Registry, name: &str, kind: WorkloadKind) {
    match registry.get(name) {
        None => {
            registry.insert(name.to_string(), kind);
        }
        Some(existing) if *existing != kind => {
            let winner = controller_priority(existing, &kind);
            registry.insert(name.to_string(), winner);
        }
        Some(_) => {}
    }
}

/// Record the controller owners of an object; returns whether any was found
fn record_controllers(registry: &mut Registry, meta: &ObjectMeta) -> bool {
    let mut found = false;
    for owner in controller_refs(meta) {
        record(registry, &owner.name, WorkloadKind::from(owner.kind.as_str()));
        found = true;
    }
    found
}

/// Pass 1: every pod names its controller, or stands alone as a `Pod`
pub(crate) fn seed_from_pods(registry: &mut Registry, pods: &[Pod]) {
    for pod in pods {
        if !record_controllers(registry, &pod.metadata) {
            let name = pod.metadata.name.as_deref().unwrap_or_default();
            registry
                .entry(name.to_string())
                .or_insert(WorkloadKind::Pod);
        }
    }
}

fn owner_meta<'a, C: PodTemplateOwner>(items: &'a [C], name: &str) -> Option<&'a ObjectMeta> {
    items
        .iter()
        .find(|c| c.name() == name)
        .map(PodTemplateOwner::metadata)
}

/// Pass 2: fold child controllers into their parents
pub(crate) fn collapse_children(registry: &mut Registry, resources: &Resources) {
    let children: Vec<(String, WorkloadKind)> = registry
        .iter()
        .filter(|(_, kind)| kind.is_child())
        .map(|(name, kind)| (name.clone(), kind.clone()))
        .collect();

    for (name, kind) in children {
        let meta = match kind {
            WorkloadKind::ReplicaSet => owner_meta(&resources.replica_sets, &name),
            WorkloadKind::ReplicationController => {
                owner_meta(&resources.replication_controllers, &name)
            }
            WorkloadKind::Job => owner_meta(&resources.jobs, &name),
            _ => None,
        };
        let Some(meta) = meta else { continue };

        for owner in controller_refs(meta) {
            record(registry, &owner.name, WorkloadKind::from(owner.kind.as_str()));

            // Deleting a CronJob leaves its Jobs behind
            let parent_exists = kind != WorkloadKind::Job
                || resources
                    .cron_jobs
                    .iter()
                    .any(|c| c.name() == owner.name);
            if parent_exists {
                registry.remove(&name);
            }
        }
    }
}

fn recover<C: PodTemplateOwner>(
    registry: &mut Registry,
    items: &[C],
    selector: &LabelSelector,
    owned_only_at_top: bool,
) {
    let empty = BTreeMap::new();
    for item in items {
        if owned_only_at_top && has_owner_refs(item.metadata()) {
            continue;
        }
        if registry.contains_key(item.name()) {
            continue;
        }
        if selector.matches(item.template_labels().unwrap_or(&empty)) {
            registry.insert(item.name().to_string(), C::kind());
        }
    }
}

/// Pass 3: surface controllers that own no pods right now
pub(crate) fn recover_idle_controllers(
    registry: &mut Registry,
    resources: &Resources,
    selector: &LabelSelector,
) {
    recover(registry, &resources.deployments, selector, false);
    recover(registry, &resources.replica_sets, selector, true);
    recover(registry, &resources.deployment_configs, selector, false);
    recover(registry, &resources.replication_controllers, selector, true);
    recover(registry, &resources.stateful_sets, selector, false);
}

/// Run all three passes over freshly fetched resources
pub(crate) fn resolve(resources: &Resources, selector: &LabelSelector) -> Registry {
    let mut registry = Registry::new();
    seed_from_pods(&mut registry, &resources.pods);
    collapse_children(&mut registry, resources);
    recover_idle_controllers(&mut registry, resources, selector);
    registry
}
