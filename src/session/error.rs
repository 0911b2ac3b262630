//! Subscription error types

use super::subscription::PatternId;

/// Error type for subscription table operations
///
/// A failed operation leaves the table untouched.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// Unsubscribing a topic that was never subscribed by name
    #[error("not subscribed to topic {0}")]
    NotSubscribed(String),

    /// The exact pattern string is already registered for this client
    #[error("pattern already subscribed: {0}")]
    DuplicatePattern(String),

    /// No pattern registered under this id
    #[error("unknown pattern subscription: {0}")]
    UnknownPattern(PatternId),

    /// The pattern string is not a valid regular expression
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}
