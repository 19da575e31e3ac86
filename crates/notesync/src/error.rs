use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed id, key, tag or notebook name. Raised before any I/O.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The write targets a note that does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Render error: {0}")]
    Render(String),
}

impl GatewayError {
    /// Errors that mean the stored credential is no good and a fresh login may help.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, GatewayError::AuthenticationFailed(_))
    }
}

impl From<minijinja::Error> for GatewayError {
    fn from(err: minijinja::Error) -> Self {
        GatewayError::Render(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
