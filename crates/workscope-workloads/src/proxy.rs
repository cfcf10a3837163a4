use async_trait::async_trait;
use tracing::warn;
use workscope_k8s::GatewayError;
use workscope_types::{ProxyStatus, Workload};

/// Source of per-pod proxy sync state, typically the mesh control plane
#[async_trait]
pub trait ProxyStatusSource: Send + Sync {
    async fn pod_proxy_status(
        &self,
        namespace: &str,
        pod: &str,
    ) -> Result<Option<ProxyStatus>, GatewayError>;
}

/// Used when no mesh control plane is configured
pub struct NoProxyStatus;

#[async_trait]
impl ProxyStatusSource for NoProxyStatus {
    async fn pod_proxy_status(
        &self,
        _namespace: &str,
        _pod: &str,
    ) -> Result<Option<ProxyStatus>, GatewayError> {
        Ok(None)
    }
}

/// What a pod gets when its proxy status cannot be read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Degraded {
    /// An empty status, as listings show it
    Empty,
    /// No status at all, as single lookups show it
    Absent,
}

/// Fill in proxy status for every pod that carries a sidecar
pub(crate) async fn enrich(source: &dyn ProxyStatusSource, workload: &mut Workload, degraded: Degraded) {
    let fallback = match degraded {
        Degraded::Empty => Some(ProxyStatus::default()),
        Degraded::Absent => None,
    };

    for pod in workload.pods.iter_mut().filter(|p| p.has_sidecar) {
        pod.proxy_status = match source.pod_proxy_status(&pod.namespace, &pod.name).await {
            Ok(Some(status)) => Some(status),
            Ok(None) => fallback.clone(),
            Err(e) => {
                warn!(namespace = %pod.namespace, pod = %pod.name, error = %e, "failed to read proxy status");
                fallback.clone()
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workscope_types::{PodInfo, WorkloadKind};

    struct Scripted;

    #[async_trait]
    impl ProxyStatusSource for Scripted {
        async fn pod_proxy_status(
            &self,
            _namespace: &str,
            pod: &str,
        ) -> Result<Option<ProxyStatus>, GatewayError> {
            match pod {
                "synced" => Ok(Some(ProxyStatus {
                    cds: "Synced".to_string(),
                    eds: "Synced".to_string(),
                    lds: "Synced".to_string(),
                    rds: "Synced".to_string(),
                })),
                "broken" => Err(GatewayError::Unavailable("istiod unreachable".to_string())),
                _ => Ok(None),
            }
        }
    }

    fn workload() -> Workload {
        let pod = |name: &str, has_sidecar: bool| {
            let mut info = PodInfo::new(name.to_string(), "bookinfo".to_string());
            info.has_sidecar = has_sidecar;
            info
        };
        let mut workload = Workload::new(
            "reviews".to_string(),
            "bookinfo".to_string(),
            WorkloadKind::Deployment,
        );
        workload.set_pods(vec![
            pod("synced", true),
            pod("broken", true),
            pod("plain", false),
        ]);
        workload
    }

    #[tokio::test]
    async fn test_listing_degrades_to_empty_status() {
        let mut workload = workload();
        enrich(&Scripted, &mut workload, Degraded::Empty).await;

        assert_eq!(workload.pods[0].proxy_status.as_ref().unwrap().cds, "Synced");
        assert_eq!(workload.pods[1].proxy_status, Some(ProxyStatus::default()));
        assert_eq!(workload.pods[2].proxy_status, None);
    }

    #[tokio::test]
    async fn test_lookup_degrades_to_absent_status() {
        let mut workload = workload();
        enrich(&Scripted, &mut workload, Degraded::Absent).await;

        assert!(workload.pods[0].proxy_status.is_some());
        assert_eq!(workload.pods[1].proxy_status, None);
    }
}
