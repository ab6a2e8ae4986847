//! Message status machine.
//!
//! ```text
//!            claim                 send ok             delivery report
//! Unknown <--------> PendingPoll --------> Sent ------------------> Delivered
//!    |    make ready      |                  |
//!    |                    | failure          | failure report
//!    +--------------------+------------------+------------> Failed
//!
//! inbound -----------------------------------------------> Received
//! ```
//!
//! `Delivered`, `Failed` and `Received` are terminal. Nothing moves a message
//! back from `Sent` to `PendingPoll`; that needs an operator outside this crate.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a stored message.
///
/// ```
/// use gsm_core::MessageStatus;
///
/// assert!(MessageStatus::PendingPoll.can_transition_to(MessageStatus::Unknown));
/// assert!(!MessageStatus::Sent.can_transition_to(MessageStatus::PendingPoll));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Unknown,
    PendingPoll,
    Sent,
    Delivered,
    Failed,
    Received,
}

impl MessageStatus {
    pub const ALL: [MessageStatus; 6] = [
        MessageStatus::Unknown,
        MessageStatus::PendingPoll,
        MessageStatus::Sent,
        MessageStatus::Delivered,
        MessageStatus::Failed,
        MessageStatus::Received,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Unknown => "unknown",
            MessageStatus::PendingPoll => "pending_poll",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Failed => "failed",
            MessageStatus::Received => "received",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MessageStatus::Delivered | MessageStatus::Failed | MessageStatus::Received
        )
    }

    /// Whether an outbound message may be created in this state.
    pub fn is_initial_outbound(&self) -> bool {
        matches!(self, MessageStatus::Unknown | MessageStatus::PendingPoll)
    }

    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        matches!(
            (self, next),
            (Unknown, PendingPoll)
                | (PendingPoll, Unknown)
                | (Unknown, Sent)
                | (PendingPoll, Sent)
                | (Sent, Delivered)
                | (Unknown, Failed)
                | (PendingPoll, Failed)
                | (Sent, Failed)
        )
    }

    /// Validates `self -> next` and returns the new status.
    pub fn transition(self, next: MessageStatus) -> Result<MessageStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl Display for MessageStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        MessageStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| format!("unknown message status `{value}`"))
    }
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: MessageStatus,
    pub to: MessageStatus,
}

/// What a claim does to the status of the messages it selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "status")]
pub enum StatusUpdate {
    /// Keep the current status. Concurrent claims may then select the same messages.
    Leave,
    /// Move every claimed message to the given status.
    Set(MessageStatus),
}

impl Default for StatusUpdate {
    fn default() -> Self {
        StatusUpdate::Set(MessageStatus::Unknown)
    }
}

impl StatusUpdate {
    /// Resolves the status a message in `current` ends up in.
    pub fn apply(self, current: MessageStatus) -> Result<MessageStatus, TransitionError> {
        match self {
            StatusUpdate::Leave => Ok(current),
            StatusUpdate::Set(next) if next == current => Ok(current),
            StatusUpdate::Set(next) => current.transition(next),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_happy_path() {
        let status = MessageStatus::PendingPoll;
        let status = status.transition(MessageStatus::Unknown).unwrap();
        let status = status.transition(MessageStatus::Sent).unwrap();
        let status = status.transition(MessageStatus::Delivered).unwrap();
        assert!(status.is_terminal());
    }

    #[test]
    fn sent_never_returns_to_pending() {
        let err = MessageStatus::Sent
            .transition(MessageStatus::PendingPoll)
            .unwrap_err();
        assert_eq!(err.from, MessageStatus::Sent);
        assert_eq!(err.to, MessageStatus::PendingPoll);
    }

    #[test]
    fn terminal_states_are_closed() {
        for terminal in MessageStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for next in MessageStatus::ALL {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} -> {next} must be rejected"
                );
            }
        }
    }

    #[test]
    fn received_is_unreachable_from_outbound_states() {
        for status in MessageStatus::ALL {
            assert!(!status.can_transition_to(MessageStatus::Received));
        }
    }

    #[test]
    fn failed_reachable_from_claimable_and_sent() {
        assert!(MessageStatus::PendingPoll.can_transition_to(MessageStatus::Failed));
        assert!(MessageStatus::Unknown.can_transition_to(MessageStatus::Failed));
        assert!(MessageStatus::Sent.can_transition_to(MessageStatus::Failed));
        assert!(!MessageStatus::Delivered.can_transition_to(MessageStatus::Failed));
    }

    #[test]
    fn status_update_leave_keeps_status() {
        assert_eq!(
            StatusUpdate::Leave.apply(MessageStatus::PendingPoll),
            Ok(MessageStatus::PendingPoll)
        );
        assert_eq!(
            StatusUpdate::Set(MessageStatus::PendingPoll).apply(MessageStatus::PendingPoll),
            Ok(MessageStatus::PendingPoll)
        );
        assert!(
            StatusUpdate::Set(MessageStatus::PendingPoll)
                .apply(MessageStatus::Delivered)
                .is_err()
        );
    }

    #[test]
    fn parses_wire_names() {
        for status in MessageStatus::ALL {
            assert_eq!(status.as_str().parse::<MessageStatus>(), Ok(status));
        }
        assert!("pending".parse::<MessageStatus>().is_err());
        let json = serde_json::to_string(&MessageStatus::PendingPoll).unwrap();
        assert_eq!(json, "\"pending_poll\"");
    }
}
