//! Core types for Swarmpost

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle state of an account
///
/// `Quarantine` and `RequireLogin` are terminal until an operator restores
/// the account from outside the core; the worker never resumes them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    #[default]
    Alive,
    Quarantine,
    RequireLogin,
}

impl AccountState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AccountState::Alive)
    }
}

impl std::fmt::Display for AccountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountState::Alive => write!(f, "alive"),
            AccountState::Quarantine => write!(f, "quarantine"),
            AccountState::RequireLogin => write!(f, "require_login"),
        }
    }
}

/// One independently-credentialed account in the registry
///
/// The credential bundle and proxy descriptor are opaque to the core: they
/// are carried to the publisher boundary untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    #[serde(default)]
    pub credentials: HashMap<String, String>,
    #[serde(default)]
    pub proxy: Option<String>,
    pub group: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub state: AccountState,
    /// Present exactly when `state` is terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Account {
    /// Whether the orchestrator should start a worker for this account
    pub fn is_eligible(&self) -> bool {
        self.enabled && self.state == AccountState::Alive
    }

    /// Apply a state transition, maintaining the state/reason invariant:
    /// a terminal state always carries a reason, `Alive` never does.
    pub fn set_state(&mut self, state: AccountState, reason: &str) {
        self.state = state;
        self.reason = if state.is_terminal() {
            Some(reason.to_string())
        } else {
            None
        };
    }
}

fn default_true() -> bool {
    true
}

/// One post to publish, owned by a content group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentUnit {
    pub caption: String,
    /// Media file references; empty for a text-only post, several for a carousel
    #[serde(default)]
    pub media: Vec<String>,
    /// Per-unit pacing override in minutes; both bounds must be present to take effect
    #[serde(default)]
    pub delay_min: Option<u32>,
    #[serde(default)]
    pub delay_max: Option<u32>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl ContentUnit {
    pub fn text(caption: &str) -> Self {
        Self {
            caption: caption.to_string(),
            media: Vec::new(),
            delay_min: None,
            delay_max: None,
            active: true,
        }
    }
}

/// Append-only record of a failed publish attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub timestamp: String,
    pub account: String,
    /// Index of the content unit within its group, or -1 when not applicable
    pub unit_index: i64,
    pub message: String,
}

impl FailureRecord {
    pub fn new(account: &str, unit_index: i64, message: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            account: account.to_string(),
            unit_index,
            message: message.to_string(),
        }
    }
}

/// Process-wide pacing configuration, memory-only
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DelayConfig {
    pub min_minutes: u32,
    pub max_minutes: u32,
    pub jitter_minutes: u32,
    pub use_individual_delays: bool,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            min_minutes: 17,
            max_minutes: 33,
            jitter_minutes: 3,
            use_individual_delays: false,
        }
    }
}

impl DelayConfig {
    /// Update the global range. An inverted range is swapped rather than
    /// rejected, and both bounds are clamped to at least one minute.
    pub fn set_range(&mut self, min_minutes: u32, max_minutes: u32) {
        let (mut lo, mut hi) = (min_minutes, max_minutes);
        if lo > hi {
            std::mem::swap(&mut lo, &mut hi);
        }
        self.min_minutes = lo.max(1);
        self.max_minutes = hi.max(1);
    }
}
