//! Post-publish verification
//!
//! The platform exhibits read-after-write propagation delay, so a single
//! eager existence check produces false quarantines. Verification is
//! three-stage and tolerant: a read that confirms the post or answers
//! ambiguously counts as success; only a clear not-found, repeated after a
//! wait and then contradicted by nothing on a direct URL probe, fails.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::publisher::{ContentPublisher, PublishOutcome};
use crate::stop::StopFlag;
use crate::types::Account;

/// What one read of the post's endpoint established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCheck {
    /// The read names the post
    Confirmed,
    /// Parse failure, unexpected shape, or a non-404 error response
    Inconclusive,
    /// The platform clearly says the post does not exist
    NotFound,
}

/// Interpret a read-endpoint outcome.
///
/// Only an unambiguous "does not exist" answer maps to `NotFound`; every
/// transport failure and every malformed body is `Inconclusive`.
pub fn interpret_read(outcome: &PublishOutcome) -> ReadCheck {
    let response = match outcome {
        PublishOutcome::Response(response) => response,
        PublishOutcome::Transport(_) => return ReadCheck::Inconclusive,
    };

    if response.status == 404 {
        return ReadCheck::NotFound;
    }
    if !response.is_success() {
        return ReadCheck::Inconclusive;
    }

    let Ok(body) = serde_json::from_str::<Value>(&response.body) else {
        return ReadCheck::Inconclusive;
    };

    if body.get("message").and_then(Value::as_str) == Some("media not found") {
        return ReadCheck::NotFound;
    }

    let has_post = body
        .get("media")
        .map(|m| !m.is_null())
        .or_else(|| body.get("items").and_then(Value::as_array).map(|a| !a.is_empty()))
        .unwrap_or(false);

    if has_post {
        ReadCheck::Confirmed
    } else {
        ReadCheck::Inconclusive
    }
}

/// Confirm a published post exists, tolerantly.
///
/// Stage 1 reads the post; anything but a clear not-found passes. Stage 2
/// waits `retry_wait` (interruptibly) and reads again. Stage 3 probes the
/// post's public URL directly. Returns `false` only when all three stages
/// agree the post is gone; a stop request mid-wait counts as success since
/// nothing was disproven.
pub async fn verify_published(
    publisher: &dyn ContentPublisher,
    account: &Account,
    post_id: &str,
    retry_wait: Duration,
    stop: &StopFlag,
) -> bool {
    match interpret_read(&publisher.fetch_post(account, post_id).await) {
        ReadCheck::Confirmed => return true,
        ReadCheck::Inconclusive => {
            debug!(account = %account.name, post_id, "verification read inconclusive, accepting");
            return true;
        }
        ReadCheck::NotFound => {}
    }

    debug!(account = %account.name, post_id, "post not visible yet, waiting before second read");
    if !stop.sleep(retry_wait).await {
        return true;
    }

    match interpret_read(&publisher.fetch_post(account, post_id).await) {
        ReadCheck::Confirmed | ReadCheck::Inconclusive => return true,
        ReadCheck::NotFound => {}
    }

    if publisher.probe_post_url(account, post_id).await {
        return true;
    }

    warn!(account = %account.name, post_id, "post absent after two reads and a direct probe");
    false
}
