//! Library modules for the susu pool monitoring agent.
//!
//! Everything lives here so the binary and the unit tests share one crate.

pub mod chain;
pub mod config;
pub mod engine;
pub mod notify;
pub mod registry;
pub mod retry;
pub mod scan;
