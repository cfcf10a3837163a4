use workscope_k8s::GatewayError;
use workscope_types::SelectorError;

#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    #[error("workload '{name}' not found in namespace '{namespace}'")]
    NotFound { namespace: String, name: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("invalid label selector: {0}")]
    InvalidSelector(#[from] SelectorError),

    #[error("invalid patch: {0}")]
    InvalidPatch(String),
}

impl WorkloadError {
    pub(crate) fn not_found(namespace: &str, name: &str) -> Self {
        Self::NotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Gateway(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Gateway(e) if e.is_forbidden())
    }
}
