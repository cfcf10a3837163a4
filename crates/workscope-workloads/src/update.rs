use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, error};
use workscope_k8s::{ClusterGateway, GatewayError};
use workscope_types::WorkloadKind;

use crate::{WorkloadConfig, WorkloadError};

/// Parse a merge patch, which must be a JSON object
pub(crate) fn parse_patch(patch: &str) -> Result<Value, WorkloadError> {
    let value: Value =
        serde_json::from_str(patch).map_err(|e| WorkloadError::InvalidPatch(e.to_string()))?;
    if !value.is_object() {
        return Err(WorkloadError::InvalidPatch(
            "merge patch must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

/// Kinds to try: just the target when it is patchable, otherwise all of them
fn candidate_kinds(target: Option<&WorkloadKind>) -> Vec<WorkloadKind> {
    match target {
        Some(kind) if WorkloadKind::PATCHABLE.contains(kind) => vec![kind.clone()],
        _ => WorkloadKind::PATCHABLE.to_vec(),
    }
}

/// Apply `patch` to whichever object of the candidate kinds carries `name`.
///
/// Every candidate is patched concurrently. A kind without such an object
/// reports not-found, which is expected; any other failure fails the call.
pub(crate) async fn patch_workload(
    gateway: &dyn ClusterGateway,
    config: &WorkloadConfig,
    namespace: &str,
    name: &str,
    target: Option<&WorkloadKind>,
    patch: &Value,
) -> Result<(), WorkloadError> {
    gateway.check_namespace(namespace).await?;

    let mut kinds = Vec::new();
    for kind in candidate_kinds(target) {
        if config.is_included(&kind) && gateway.supports_kind(&kind).await {
            kinds.push(kind);
        }
    }

    let results = join_all(kinds.iter().map(|kind| async move {
        let result = gateway.patch_workload(namespace, name, kind, patch).await;
        (kind, result)
    }))
    .await;

    let mut first_error: Option<GatewayError> = None;
    for (kind, result) in results {
        match result {
            Ok(()) => debug!(namespace, name, %kind, "patched workload"),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                error!(namespace, name, %kind, error = %e, "error patching workload");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use workscope_k8s::fake::{FakeGateway, fixtures};

    #[test]
    fn test_patch_must_be_an_object() {
        assert!(parse_patch(r#"{"metadata":{"labels":{"a":"b"}}}"#).is_ok());
        assert!(matches!(
            parse_patch("[1, 2]"),
            Err(WorkloadError::InvalidPatch(_))
        ));
        assert!(matches!(
            parse_patch("{not json"),
            Err(WorkloadError::InvalidPatch(_))
        ));
    }

    #[test]
    fn test_candidate_kinds() {
        assert_eq!(
            candidate_kinds(Some(&WorkloadKind::StatefulSet)),
            vec![WorkloadKind::StatefulSet]
        );
        assert_eq!(candidate_kinds(None).len(), 8);
        assert_eq!(
            candidate_kinds(Some(&WorkloadKind::Other("DaemonSet".to_string()))).len(),
            8
        );
    }

    #[tokio::test]
    async fn test_not_found_kinds_are_ignored() {
        let gateway = FakeGateway::new().with_deployments(vec![fixtures::deployment(
            "bookinfo",
            "reviews-v1",
            &[("app", "reviews")],
            1,
        )]);
        let config = WorkloadConfig::default();
        let patch = json!({ "metadata": { "labels": { "team": "books" } } });

        patch_workload(&gateway, &config, "bookinfo", "reviews-v1", None, &patch)
            .await
            .unwrap();

        // DeploymentConfig is skipped on clusters without OpenShift
        let kinds: Vec<WorkloadKind> = gateway.patches().into_iter().map(|p| p.kind).collect();
        assert_eq!(kinds.len(), 7);
        assert!(!kinds.contains(&WorkloadKind::DeploymentConfig));
    }

    #[tokio::test]
    async fn test_other_errors_fail_the_update() {
        let gateway = FakeGateway::new().fail("patch_statefulset", "admission webhook denied");
        let config = WorkloadConfig::default();

        let err = patch_workload(&gateway, &config, "bookinfo", "x", None, &json!({}))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("admission webhook denied"));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_target_kind_patches_only_that_kind() {
        let gateway = FakeGateway::new();
        let config = WorkloadConfig {
            excluded_workloads: vec![WorkloadKind::Job],
            ..Default::default()
        };

        patch_workload(
            &gateway,
            &config,
            "bookinfo",
            "x",
            Some(&WorkloadKind::CronJob),
            &json!({}),
        )
        .await
        .unwrap();
        assert_eq!(gateway.patches().len(), 1);

        patch_workload(
            &gateway,
            &config,
            "bookinfo",
            "x",
            Some(&WorkloadKind::Job),
            &json!({}),
        )
        .await
        .unwrap();
        assert_eq!(gateway.patches().len(), 1);
    }

    #[tokio::test]
    async fn test_forbidden_namespace_patches_nothing() {
        let gateway = FakeGateway::new().forbid_namespace("bookinfo");
        let config = WorkloadConfig::default();

        let err = patch_workload(&gateway, &config, "bookinfo", "x", None, &json!({}))
            .await
            .unwrap_err();
        assert!(err.is_forbidden());
        assert!(gateway.patches().is_empty());
    }
}
