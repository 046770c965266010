//! # cmh-core
//!
//! Core types for the concurrent mutable collection harness.
//!
//! This crate provides:
//! - `Strategy`: the four concurrency-safety strategies under comparison
//! - `SharedContainer`: the contract every strategy's container implements
//! - `KeyPattern`: what writer tasks write, and the size a run must reach
//! - `RunResult` / `RunFault`: what a harness run reports
//! - `Verifier` and `verify`: post-run acceptance and structural invariants

pub mod container;
pub mod error;
pub mod invariants;
pub mod pattern;
pub mod property;
pub mod result;
pub mod strategy;
pub mod verifier;

pub use container::{ContainerSnapshot, SharedContainer};
pub use error::{ConfigError, RunFault, WriteError};
pub use pattern::{value_for_key, KeyPattern};
pub use property::{PropertyChecker, PropertyResult};
pub use result::{RunResult, TaskOutcome};
pub use strategy::{ContainerKind, Strategy};
pub use verifier::{verify, RaceLoss, Verification, Verifier};
