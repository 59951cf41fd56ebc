use std::path::PathBuf;

use thiserror::Error;

/// Main library error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum FleurError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No path found for '{name}' (filters: {filters}); no candidates remain")]
    NoPathFound { name: String, filters: String },

    #[error("No unique path found for '{name}' (filters: {filters}); candidates: {}", candidates.join(", "))]
    NoUniquePathFound {
        name: String,
        filters: String,
        candidates: Vec<String>,
    },

    #[error("Failed to convert '{text}' for '{name}' (tried: {}): {reason}", types.join(", "))]
    Conversion {
        name: String,
        text: String,
        types: Vec<String>,
        reason: String,
    },

    #[error("Invalid complex XPath '{complex}': not a refinement of '{simple}'")]
    InvalidPath { complex: String, simple: String },

    #[error("Ordering error below '{parent}': {details}")]
    Ordering { parent: String, details: String },

    #[error("Schema version error: {details}")]
    SchemaVersion { details: String },

    #[error("Transformation '{name}' failed on {input}: {reason}")]
    Transformation {
        name: String,
        input: String,
        reason: String,
    },

    #[error("Ambiguous constant definition: '{name}' is already defined")]
    AmbiguousConstant { name: String },

    #[error("Schema parsing error: {path} - {details}")]
    SchemaParsing { path: PathBuf, details: String },

    #[error("LibXML2 error: {0}")]
    LibXml2(#[from] LibXml2Error),

    #[error("XPath error: {expression} - {details}")]
    XPath { expression: String, details: String },

    #[error("Missing data: {details}")]
    MissingData { details: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation '{operation}' is not supported for version {version}: {details}")]
    UnsupportedOperation {
        operation: String,
        version: String,
        details: String,
    },

    #[error("Recipe error: {0}")]
    Recipe(String),

    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("XML validation failed: {source_name} - {}", errors.join("; "))]
    ValidationFailed {
        source_name: String,
        errors: Vec<String>,
    },
}

/// Configuration-specific error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

/// LibXML2-specific error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LibXml2Error {
    #[error("Schema parsing failed: {}", errors.join("; "))]
    SchemaParseFailed { errors: Vec<String> },

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("Document parsing failed for {source_name}: {}", errors.join("; "))]
    DocumentParseFailed {
        source_name: String,
        errors: Vec<String>,
    },

    #[error("XInclude processing failed: {}", errors.join("; "))]
    XIncludeFailed { errors: Vec<String> },

    #[error("XPath evaluation failed for '{expression}': {}", errors.join("; "))]
    XPathFailed {
        expression: String,
        errors: Vec<String>,
    },

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,

    #[error("Invalid XML structure: {details}")]
    InvalidXml { details: String },

    #[error("String contains an interior NUL byte: {0:?}")]
    InteriorNul(String),
}

// Error conversion implementations
impl From<ConfigError> for FleurError {
    fn from(err: ConfigError) -> Self {
        FleurError::Config(err.to_string())
    }
}

impl FleurError {
    /// Build the error reported when the stringly typed argument of an operation is invalid
    pub fn invalid(msg: impl Into<String>) -> Self {
        FleurError::InvalidArgument(msg.into())
    }

    /// Whether the error describes data that is simply absent (lenient mode may demote it)
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            FleurError::MissingData { .. } | FleurError::Conversion { .. }
        )
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, FleurError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;
