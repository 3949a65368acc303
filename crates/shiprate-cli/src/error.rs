use shiprate_core::CoreError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] shiprate_core::ValidationError),

    #[error("invalid shipment: {0}")]
    InvalidShipment(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::InvalidShipment(_) => 2,
            Self::Core(error) => core_exit_code(error),
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}

/// Exit code for a core failure.
pub const fn core_exit_code(error: &CoreError) -> u8 {
    match error {
        CoreError::Validation(_) => 2,
        CoreError::Aggregation(_) => 3,
        CoreError::Serialization(_) => 4,
        CoreError::Store(_) => 10,
    }
}
