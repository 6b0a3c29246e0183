//! Flexibility Score library
//!
//! This crate provides the core functionality for:
//! - Reconstructing instances, launch templates and scaling groups from
//!   audit events
//! - Scoring accounts on four compute-flexibility components
//! - Weighted aggregation to windowed account and organization scores
//! - Orchestrating daily evaluation runs across an organization
//! - Publishing metrics and archiving snapshots
//! - Health checks and observability

pub mod aggregate;
pub mod backends;
pub mod error;
pub mod events;
pub mod health;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod publish;
pub mod resources;
pub mod scores;
pub mod time_window;
pub mod usage;

pub use error::{FlexError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse, Stage,
};
pub use models::*;
pub use observability::{RunMetrics, StructuredLogger};
pub use scores::{MetricName, ScoreRecord, ScoreWeights};
pub use time_window::TimeWindow;
