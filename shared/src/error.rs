use thiserror::Error;

/// Errors surfaced by map construction and the handful of operations that can
/// reject caller input. Lookup and data misses are not errors: they are logged
/// and the operation becomes a no-op.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("map asset could not be parsed: {0}")]
    Asset(String),

    #[error("map asset failed to load: {0}")]
    AssetLoad(String),

    #[error("shape markup is invalid: {0}")]
    Shape(String),

    #[error("country data is invalid: {0}")]
    CountryData(#[from] serde_json::Error),
}

/// Option values rejected at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A callback option resolved to something that cannot be called.
    #[error("option `{option}` must be a function or the name of a global function")]
    NotCallable { option: String },

    #[error("option `{option}` has invalid value `{value}`")]
    InvalidValue { option: &'static str, value: String },
}

impl From<roxmltree::Error> for MapError {
    fn from(err: roxmltree::Error) -> Self {
        Self::Asset(err.to_string())
    }
}
