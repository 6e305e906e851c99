//! Swarmpost - unattended multi-account content publication
//!
//! This library provides the account orchestration and failure
//! classification core: per-account worker loops, the account state
//! machine, response classification policy, humanized pacing, and
//! durable, concurrency-safe account and failure state.

pub mod classify;
pub mod config;
pub mod content;
pub mod delay;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod orchestrator;
pub mod publisher;
pub mod stop;
pub mod store;
pub mod types;
pub mod verify;
pub mod worker;

// Re-export commonly used types
pub use classify::{classify, Action, Classification, Classifier};
pub use config::{Config, RunnerConfig, SelectionMode, StorageConfig};
pub use content::ContentLibrary;
pub use error::{Result, SwarmError};
pub use ledger::FailureLedger;
pub use orchestrator::Orchestrator;
pub use publisher::{ContentPublisher, HttpResponse, MockPublisher, PublishOutcome};
pub use stop::StopFlag;
pub use store::AccountStore;
pub use types::{Account, AccountState, ContentUnit, DelayConfig, FailureRecord};
pub use worker::AccountWorker;
