use serde::Deserialize;
use workscope_types::WorkloadKind;

pub const DEFAULT_SIDECAR_ANNOTATION: &str = "sidecar.istio.io/status";
pub const DEFAULT_APP_LABEL: &str = "app";

/// Settings that shape workload resolution
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Kinds that are never fetched, resolved or patched
    pub excluded_workloads: Vec<WorkloadKind>,
    /// Pod annotation that marks an injected mesh proxy
    pub sidecar_annotation: String,
    /// Label naming the application a workload belongs to
    pub app_label_name: String,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            excluded_workloads: Vec::new(),
            sidecar_annotation: DEFAULT_SIDECAR_ANNOTATION.to_string(),
            app_label_name: DEFAULT_APP_LABEL.to_string(),
        }
    }
}

impl WorkloadConfig {
    pub fn is_included(&self, kind: &WorkloadKind) -> bool {
        !self.excluded_workloads.contains(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusions() {
        let config = WorkloadConfig {
            excluded_workloads: vec![WorkloadKind::CronJob, WorkloadKind::DeploymentConfig],
            ..Default::default()
        };
        assert!(!config.is_included(&WorkloadKind::CronJob));
        assert!(config.is_included(&WorkloadKind::Deployment));
        assert!(WorkloadConfig::default().is_included(&WorkloadKind::CronJob));
    }
}
