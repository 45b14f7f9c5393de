use thiserror::Error;

/// Errors raised by the event bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus refused or could not store the message.
    #[error("Publish to topic {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// The member has not joined the group it is polling or acking for.
    #[error("Member {member} is not part of consumer group {group}")]
    NotAMember { group: String, member: String },

    /// A subscription must name at least one topic.
    #[error("Subscription for group {0} names no topics")]
    NoTopics(String),

    /// An outbound message was built without a required field.
    #[error("Message is missing required field: {0}")]
    MissingField(&'static str),

    /// A payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
