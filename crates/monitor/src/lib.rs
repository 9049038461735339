//! Service shell for the energy monitor
//!
//! Exposes the router and configuration so integration tests can drive
//! the API without a running process.

pub mod api;
pub mod config;
