//! Core contracts and value types for the messaging gateway.
//!
//! This crate holds the message model shared by providers and the dispatch
//! coordinator: the status machine that guards every transition, the message
//! store contract (with an in-memory backend and an optional SQLite one), the
//! error taxonomy surfaced by providers, and tracking id generation.
pub mod errors;
pub mod status;
pub mod store;
pub mod tracking;
pub mod types;

pub use errors::*;
pub use status::*;
pub use store::*;
pub use tracking::*;
pub use types::*;

/// Returns the semantic version advertised by this crate.
///
/// ```
/// assert_eq!(gsm_core::version(), env!("CARGO_PKG_VERSION"));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
