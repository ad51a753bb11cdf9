use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Failures raised by a registered handler while processing an envelope.
///
/// These never leave [`EventRouter::dispatch`](crate::stream::EventRouter::dispatch);
/// the router logs them and keeps delivering to the remaining handlers.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("envelope for {topic} carried no data")]
    MissingData { topic: String },

    #[error("{0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not connected")]
    NotConnected,

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(Box::new(err))
    }
}

impl Error {
    /// True for failures of the underlying connection (as opposed to local misuse).
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::WebSocket(_) | Self::Transport(_) | Self::Io(_))
    }
}
