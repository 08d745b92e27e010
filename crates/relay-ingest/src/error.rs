//! Error types for NATS ingestion.

/// Errors that can occur while ingesting from NATS.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Failed to connect to or communicate with the NATS server.
    #[error("NATS error: {0}")]
    Nats(String),

    /// A message payload could not be decoded.
    #[error("payload parse error on {subject}: {source}")]
    Parse {
        /// Subject the message arrived on.
        subject: String,
        /// The underlying decoding error.
        #[source]
        source: serde_json::Error,
    },

    /// The subject matches neither the registration nor the event pattern.
    #[error("unrecognized subject: {0}")]
    UnknownSubject(String),
}
