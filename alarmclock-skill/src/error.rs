//! Error types shared across the skill.

use time::PrimitiveDateTime;

use crate::types::SiteId;

/// Why an alarm time was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("alarm time {requested} is in the past (now {now})")]
    InPast {
        requested: PrimitiveDateTime,
        now: PrimitiveDateTime,
    },

    #[error("alarm time {requested} is less than {min_lead_secs} s from now ({now})")]
    TooSoon {
        requested: PrimitiveDateTime,
        now: PrimitiveDateTime,
        min_lead_secs: i64,
    },
}

/// Failure talking to the message bus.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("bus client unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure reading or writing the durable alarm record.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("alarm store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode alarm record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Malformed or unexpected inbound message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("unhandled topic {0}")]
    UnknownTopic(String),

    #[error("malformed payload on {topic}: {source}")]
    Payload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unknown site {0}")]
    UnknownSite(SiteId),

    #[error("room {0} is not configured")]
    UnknownRoom(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
