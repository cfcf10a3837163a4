/// Errors reported by the cluster gateway and the namespace cache
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    Forbidden(String),

    #[error("Kubernetes API error: {0}")]
    Api(#[source] kube::Error),

    #[error("failed to interpret {kind} '{name}': {reason}")]
    Parse {
        kind: String,
        name: String,
        reason: String,
    },

    #[error("cluster unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }
}

impl From<kube::Error> for GatewayError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref response) if response.code == 404 => {
                Self::NotFound(response.message.clone())
            }
            kube::Error::Api(ref response) if response.code == 403 => {
                Self::Forbidden(response.message.clone())
            }
            other => Self::Api(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, message: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn test_not_found_is_distinguished() {
        let err = GatewayError::from(api_error(404, "deployments.apps \"x\" not found"));
        assert!(err.is_not_found());
        assert!(!err.is_forbidden());
    }

    #[test]
    fn test_forbidden_is_distinguished() {
        let err = GatewayError::from(api_error(403, "namespaces \"secret\" is forbidden"));
        assert!(err.is_forbidden());
    }

    #[test]
    fn test_other_codes_are_upstream_failures() {
        let err = GatewayError::from(api_error(500, "etcd timeout"));
        assert!(matches!(err, GatewayError::Api(_)));
        assert!(!err.is_not_found());
    }
}
