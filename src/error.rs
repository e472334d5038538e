use thiserror::Error;
use crate::types::ids::ConnectionId;

#[derive(Error, Debug)]
pub enum Error {
    // Event Log Errors
    #[error("Kafka error: {0}")]
    KafkaError(String),

    #[error("Event deserialization failed: {0}")]
    DeserializationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Empty payload")]
    EmptyPayload,

    #[error("Topic closed: {0}")]
    TopicClosed(String),

    // Connector Errors
    #[error("Fetch failed for {source_id}: {reason}")]
    FetchFailure {
        source_id: String,
        reason: String,
    },

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Invalid price")]
    InvalidPrice,

    #[error("Price connector not connected")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    // Gateway Errors
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    // System Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Task failure: {0}")]
    TaskFailure(String),

    // IO Errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    pub fn fetch(source_id: &str, reason: impl ToString) -> Self {
        Error::FetchFailure {
            source_id: source_id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Errors after which a streaming socket has to be re-established.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Error::ConnectionClosed | Error::NotConnected | Error::WebSocketError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
