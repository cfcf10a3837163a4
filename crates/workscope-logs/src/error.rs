use workscope_k8s::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("invalid duration [{input}]: {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("invalid sinceTime [{input}]: {reason}")]
    InvalidSinceTime { input: String, reason: String },

    #[error("invalid tailLines [{input}]: {reason}")]
    InvalidTailLines { input: String, reason: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
