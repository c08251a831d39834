use thiserror::Error;

/// Top-level error type for the MOB process.
///
/// Subsystem crates keep their own error enums and convert into this one
/// where a failure has to cross into process setup (config loading, server
/// startup) so the `?` operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MobError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for MobError {
    fn from(err: toml::de::Error) -> Self {
        MobError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MobError {
    fn from(err: serde_json::Error) -> Self {
        MobError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for MOB operations.
pub type Result<T> = std::result::Result<T, MobError>;
