//! Configuration errors.

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A TOML file failed to parse.
    #[error("failed to parse {path}: {source}")]
    ParseError {
        /// File that failed.
        path: String,
        /// Underlying parse error.
        source: toml::de::Error,
    },

    /// The merged tree does not match the configuration schema.
    #[error("invalid configuration: {0}")]
    SchemaError(#[source] toml::de::Error),

    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    ReadError {
        /// File that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A file exceeds the size limit.
    #[error("{path} is {size} bytes, limit is {limit}")]
    FileTooLarge {
        /// Offending file.
        path: String,
        /// Actual size.
        size: u64,
        /// Allowed size.
        limit: u64,
    },

    /// A field failed validation.
    #[error("invalid value for {field}: {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Serializing the resolved configuration failed.
    #[error("failed to render configuration: {0}")]
    RenderError(String),

    /// The home directory could not be determined.
    #[error("could not determine home directory")]
    NoHomeDir,
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
