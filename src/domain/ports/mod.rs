//! Injected capabilities: hook traits and the task-id generator.
//!
//! These are the seams at which the core defers policy to the embedding
//! application. Every port has a working no-op default, so wiring none of
//! them up still yields fully functional dispatch/poll/await behavior.

pub mod hooks;
pub mod id_generator;

pub use hooks::{
    DelegationCompleteHook, DelegationDecision, DelegationOverrides, DelegationRequest,
    DelegationStartHook, NoOpDelegationCompleteHook, NoOpDelegationStartHook,
    NoOpTaskCompleteOracle, TaskCompleteOracle,
};
pub use id_generator::{TaskIdGenerator, UuidTaskIdGenerator};
