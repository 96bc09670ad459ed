use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] mktdata_core::ValidationError),

    #[error(transparent)]
    Core(#[from] mktdata_core::CoreError),

    #[error("currency conversion failed: {0}")]
    Conversion(#[from] mktdata_core::SourceError),

    #[error("cannot read config '{path}': {source}")]
    Config {
        path: String,
        source: std::io::Error,
    },

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Core(mktdata_core::CoreError::Validation(_)) => 2,
            Self::Conversion(error)
                if error.kind() == mktdata_core::SourceErrorKind::InvalidRequest =>
            {
                2
            }
            Self::Config { .. } => 2,
            _ => 10,
        }
    }
}
