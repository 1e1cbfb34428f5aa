pub type Result<T, E = EncodeError> = std::result::Result<T, E>;

/// Errors raised while turning model objects into wire JSON.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Value cannot be encoded as JSON: {0}")]
    NotEncodable(String),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

/// Errors raised while decoding wire JSON into native values.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("{message}")]
    Server {
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Missing '@value' for type {0}")]
    MissingValue(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid uuid '{value}': {source}")]
    InvalidUuid {
        value: String,
        #[source]
        source: uuid::Error,
    },

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}
