//! OpenShift `DeploymentConfig`
//!
//! k8s-openapi does not ship OpenShift types, so the objects are read as
//! dynamic objects and decoded into the subset of fields workscope uses.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use serde::{Deserialize, Serialize};

use crate::GatewayError;

pub const DEPLOYMENT_CONFIG_GROUP: &str = "apps.openshift.io";

/// API resource descriptor for `deploymentconfigs.apps.openshift.io/v1`
pub fn deployment_config_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(DEPLOYMENT_CONFIG_GROUP, "v1", "DeploymentConfig"),
        "deploymentconfigs",
    )
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: DeploymentConfigSpec,
    #[serde(default)]
    pub status: DeploymentConfigStatus,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfigSpec {
    pub replicas: Option<i32>,
    pub selector: Option<BTreeMap<String, String>>,
    pub template: Option<PodTemplateSpec>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentConfigStatus {
    pub replicas: i32,
    pub available_replicas: i32,
    pub updated_replicas: i32,
}

impl TryFrom<DynamicObject> for DeploymentConfig {
    type Error = GatewayError;

    fn try_from(obj: DynamicObject) -> Result<Self, Self::Error> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let parse_error = |reason: String| GatewayError::Parse {
            kind: "DeploymentConfig".to_string(),
            name: name.clone(),
            reason,
        };

        let value = serde_json::to_value(&obj).map_err(|e| parse_error(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| parse_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_from_dynamic_object() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "apps.openshift.io/v1",
            "kind": "DeploymentConfig",
            "metadata": { "name": "ratings-v1", "namespace": "bookinfo" },
            "spec": {
                "replicas": 2,
                "selector": { "app": "ratings" },
                "template": { "metadata": { "labels": { "app": "ratings", "version": "v1" } } }
            },
            "status": { "replicas": 2, "availableReplicas": 1 }
        }))
        .unwrap();

        let dc = DeploymentConfig::try_from(obj).unwrap();
        assert_eq!(dc.metadata.name.as_deref(), Some("ratings-v1"));
        assert_eq!(dc.spec.replicas, Some(2));
        assert_eq!(dc.status.available_replicas, 1);
        let labels = dc
            .spec
            .template
            .and_then(|t| t.metadata)
            .and_then(|m| m.labels)
            .unwrap();
        assert_eq!(labels.get("version").map(String::as_str), Some("v1"));
    }

    #[test]
    fn test_malformed_spec_is_a_parse_failure() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "apps.openshift.io/v1",
            "kind": "DeploymentConfig",
            "metadata": { "name": "broken" },
            "spec": { "replicas": "many" }
        }))
        .unwrap();

        let err = DeploymentConfig::try_from(obj).unwrap_err();
        assert!(matches!(err, GatewayError::Parse { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_resource_descriptor() {
        let ar = deployment_config_resource();
        assert_eq!(ar.api_version, "apps.openshift.io/v1");
        assert_eq!(ar.plural, "deploymentconfigs");
    }
}
