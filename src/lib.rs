//! Temperature introspection: a resumable result store and paired bootstrap
//! comparator for LLM experiments
//!
//! Language models write sentences under varying sampling temperatures, and
//! models (the same or others) then guess from the sentence alone whether the
//! temperature was HIGH or LOW. This crate runs those experiments and analyzes
//! them:
//!
//! - **Result store**: one record per (condition kind, generator, predictor,
//!   sample), checked before every call so interrupted runs resume
//! - **Join + bootstrap**: arms paired by source sample, 95% intervals from a
//!   seeded paired bootstrap
//! - **Metrics**: accuracy, balanced accuracy, macro-F1 and majority baseline
//!   per predictor and condition
//!
//! # Quick Start
//!
//! ```rust
//! use introspection::analysis::BootstrapEstimator;
//!
//! let self_reflection = [1.0, 1.0, 0.0, 1.0];
//! let within_model = [0.0, 1.0, 0.0, 0.0];
//!
//! let mut estimator = BootstrapEstimator::default().with_iterations(1_000);
//! let estimate = estimator.paired_delta(&self_reflection, &within_model).unwrap();
//! assert_eq!(estimate.observed, 0.5);
//! assert_eq!(estimate.n_paired, 4);
//! ```

pub mod analysis;
pub mod config;
pub mod core;
pub mod events;
pub mod executor;
pub mod experiments;
pub mod llm;
pub mod prompt;
pub mod store;

pub use analysis::{BootstrapEstimate, BootstrapEstimator};
pub use config::{EnvConfig, ExperimentConfig};
pub use events::{EventBus, ExperimentEvent, LoggingObserver};
pub use executor::{Executor, RunCounts};
pub use store::{ResultStore, Scope, Study1Corpus};
