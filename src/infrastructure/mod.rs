//! Infrastructure layer: ambient concerns that sit outside the domain and
//! service layers.
//!
//! - `config`: layered configuration (defaults → YAML → env) for
//!   [`crate::domain::models::SubagentLimits`].
//! - `logging`: structured `tracing` setup, audit trail, log rotation, and
//!   secret scrubbing.

pub mod config;
pub mod logging;
