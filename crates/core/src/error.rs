#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Policy misconfigured: {0}")]
    PolicyMisconfigured(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}
