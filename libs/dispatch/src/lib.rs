//! Dispatch coordinator for the messaging gateway.
//!
//! A send cycle claims `PendingPoll` messages per provider (moving them to
//! `Unknown`), sends each one and writes the outcome back. A fetch cycle asks
//! every polling provider for new inbound messages.

mod coordinator;
mod errors;
mod report;

pub use coordinator::DispatchCoordinator;
pub use errors::DispatchError;
pub use report::{
    CycleReport, DispatchFailure, DispatchReport, FetchReport, ProviderFailure, ReceiveOutcome,
};
