use thiserror::Error;

use crate::status::{MessageStatus, TransitionError};
use crate::types::MessageId;

/// Errors raised by message stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message not found: {0}")]
    NotFound(String),
    #[error("message `{provider_message_id}` already recorded for provider `{provider}`")]
    Duplicate {
        provider: String,
        provider_message_id: String,
    },
    #[error("invalid status transition {from} -> {to} (message {id:?})")]
    InvalidTransition {
        id: Option<MessageId>,
        from: MessageStatus,
        to: MessageStatus,
    },
    #[error("message {id}: expected status {expected}, found {actual}")]
    Conflict {
        id: MessageId,
        expected: MessageStatus,
        actual: MessageStatus,
    },
    #[error("message store error")]
    Internal(#[source] anyhow::Error),
}

impl StoreError {
    pub(crate) fn transition(id: Option<MessageId>, err: TransitionError) -> Self {
        StoreError::InvalidTransition {
            id,
            from: err.from,
            to: err.to,
        }
    }
}

/// Errors surfaced by provider operations.
///
/// ```
/// use gsm_core::ProviderError;
///
/// let err = ProviderError::unavailable("smssync", "gateway returned 503");
/// assert_eq!(err.code(), "provider_unavailable");
/// assert!(err.is_retryable());
/// ```
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider `{provider}` unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },
    #[error("provider `{provider}` rejected recipient `{to}`: {reason}")]
    InvalidRecipient {
        provider: String,
        to: String,
        reason: String,
    },
    #[error("provider `{provider}` already recorded message `{provider_message_id}`")]
    DuplicateMessage {
        provider: String,
        provider_message_id: String,
    },
    #[error("provider `{provider}` did not answer within {after_ms}ms")]
    Timeout { provider: String, after_ms: u64 },
    #[error(transparent)]
    Store(StoreError),
}

impl ProviderError {
    pub fn unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        ProviderError::ProviderUnavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_recipient(
        provider: impl Into<String>,
        to: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ProviderError::InvalidRecipient {
            provider: provider.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::ProviderUnavailable { .. } => "provider_unavailable",
            ProviderError::InvalidRecipient { .. } => "invalid_recipient",
            ProviderError::DuplicateMessage { .. } => "duplicate_message",
            ProviderError::Timeout { .. } => "timeout",
            ProviderError::Store(_) => "store_error",
        }
    }

    /// Transport failures may succeed on a later cycle; everything else will not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::ProviderUnavailable { .. } | ProviderError::Timeout { .. }
        )
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, ProviderError::DuplicateMessage { .. })
    }
}

impl From<StoreError> for ProviderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate {
                provider,
                provider_message_id,
            } => ProviderError::DuplicateMessage {
                provider,
                provider_message_id,
            },
            other => ProviderError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_store_error_maps_to_duplicate_message() {
        let err: ProviderError = StoreError::Duplicate {
            provider: "twitter".into(),
            provider_message_id: "123".into(),
        }
        .into();
        assert!(err.is_duplicate());
        assert_eq!(err.code(), "duplicate_message");
        assert!(!err.is_retryable());
    }

    #[test]
    fn invalid_recipient_is_permanent() {
        let err = ProviderError::invalid_recipient("email", "not-an-address", "missing @");
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "provider `email` rejected recipient `not-an-address`: missing @"
        );
    }

    #[test]
    fn timeout_is_retryable() {
        let err = ProviderError::Timeout {
            provider: "smssync".into(),
            after_ms: 50,
        };
        assert!(err.is_retryable());
        assert_eq!(err.code(), "timeout");
    }
}
