use xtql::{DecodeError, EncodeError};

/// Problems with a textual SQL submission, raised before anything is sent.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SqlParsingError {
    #[error("No statements found")]
    NoStatements,

    #[error("SET statements must appear only at the start of a session block")]
    MisplacedSet,

    #[error("Cannot mix queries and transactions")]
    MixedBatch,

    #[error("Unknown session variable: {0}")]
    UnknownSessionVariable(String),

    #[error("Malformed SET statement: {0}")]
    MalformedSet(String),

    #[error("Failed to tokenize SQL: {0}")]
    Tokenize(String),
}

#[derive(Debug, thiserror::Error)]
pub enum XtdbError {
    #[error("Error {action}: {status} ({reason}): {body}")]
    Http {
        action: &'static str,
        status: u16,
        reason: String,
        body: String,
    },

    #[error("Error in {request} request: {source}")]
    Request {
        request: &'static str,
        #[source]
        source: Box<XtdbError>,
    },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    SqlParsing(#[from] SqlParsingError),

    #[error("{0} already closed")]
    Closed(&'static str),

    #[error("Called before `execute`")]
    NoResults,

    #[error("{0}")]
    NotSupported(&'static str),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl XtdbError {
    /// The innermost error, looking through request wrappers.
    pub fn root(&self) -> &XtdbError {
        match self {
            XtdbError::Request { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn in_request(request: &'static str) -> impl FnOnce(XtdbError) -> XtdbError {
        move |e| match e {
            // Status failures already name the action.
            e @ XtdbError::Http { .. } => e,
            e => XtdbError::Request {
                request,
                source: Box::new(e),
            },
        }
    }
}

pub type Result<T, E = XtdbError> = std::result::Result<T, E>;
