//! Providers shipped with the registry.

pub mod log;
