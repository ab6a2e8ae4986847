use std::collections::BTreeMap;

use gsm_core::{Message, MessageId};
use serde::Serialize;

/// A message whose send attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub message_id: MessageId,
    pub provider: String,
    pub code: String,
    pub error: String,
    /// True when the message went back to `PendingPoll`.
    pub requeued: bool,
}

/// A provider left out of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub code: String,
    pub error: String,
}

/// Counts for one send cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub claimed: usize,
    pub sent: usize,
    pub delivered: usize,
    pub failed: usize,
    pub requeued: usize,
    /// Accepted by the provider, but the outcome could not be written back.
    pub unrecorded: usize,
    pub skipped: Vec<ProviderFailure>,
    pub failures: Vec<DispatchFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }
}

/// Counts for one fetch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    pub fetched: usize,
    pub per_provider: BTreeMap<String, usize>,
    pub errors: Vec<ProviderFailure>,
}

/// Result of the receive path.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveOutcome {
    Stored(Message),
    /// The provider message id was already stored; nothing changed.
    Duplicate,
}

impl ReceiveOutcome {
    pub fn message(&self) -> Option<&Message> {
        match self {
            ReceiveOutcome::Stored(message) => Some(message),
            ReceiveOutcome::Duplicate => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub fetch: FetchReport,
    pub dispatch: DispatchReport,
}
