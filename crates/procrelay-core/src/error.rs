use thiserror::Error;

/// Core error types for procrelay operations
#[derive(Error, Debug)]
pub enum ProcrelayError {
    #[error("Failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process management error: {0}")]
    ProcessError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Relay error: {0}")]
    Relay(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ProcrelayError {
    pub fn process_error(message: impl Into<String>) -> Self {
        Self::ProcessError(message.into())
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::ConfigurationError(message.into())
    }

    /// Check if this error cannot go away by launching again unchanged
    pub fn is_permanent(&self) -> bool {
        match self {
            ProcrelayError::ConfigurationError(_) => true,
            ProcrelayError::SpawnFailed { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }
}

impl From<crate::LaunchSpecBuilderError> for ProcrelayError {
    fn from(e: crate::LaunchSpecBuilderError) -> Self {
        ProcrelayError::ConfigurationError(e.to_string())
    }
}
