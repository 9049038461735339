//! Core library for the solar energy monitor
//!
//! This crate provides the core functionality for:
//! - Reading ingestion and delta computation
//! - Baseline-driven plausibility classification
//! - Alert evaluation and WebSocket fan-out
//! - Postgres and in-memory persistence
//! - Health checks and observability

pub mod alert;
pub mod baseline;
pub mod error;
pub mod health;
pub mod ingest;
pub mod models;
pub mod observability;
pub mod store;

pub use error::{MonitorError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
