//! # cmh-harness
//!
//! Runs competing writer tasks against a shared container and reports what
//! the container holds afterwards.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use cmh_core::{verify, Strategy};
//!
//! let result = cmh_harness::run(Strategy::MutexWrapped, 2, 1000, Duration::from_secs(5))?;
//! assert_eq!(result.final_size, 2000);
//! assert!(verify(&result, Strategy::MutexWrapped, 2000));
//! # Ok::<(), cmh_harness::HarnessError>(())
//! ```
//!
//! ## Side-by-side runs
//!
//! `Harness::run_side_by_side` starts several lanes (one container each)
//! behind the same start gate, so e.g. two unsynchronized, two lock-wrapped
//! and two copy-on-write writers all race at once.
//!
//! ## Configuration
//!
//! `HarnessConfig::with_env_overrides` reads `CMH_TASKS`, `CMH_ITERATIONS`,
//! `CMH_TIMEOUT_MS` and `CMH_SEED`.

pub mod config;
pub mod harness;
pub mod writer;

pub use config::{get_or_generate_seed, HarnessConfig};
pub use harness::{run, Harness, HarnessError, Lane};
pub use writer::WriterTask;
