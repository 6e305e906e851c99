//! Response classification policy
//!
//! [`classify`] is the central policy: it maps a raw publish outcome to one
//! of success / retry / quarantine / block, with a human-readable detail.
//! The rules apply in strict precedence order, first match wins. The pure
//! function carries no side effects; [`Classifier`] wraps it and applies
//! the mandated store transition and ledger record for each action.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::ledger::FailureLedger;
use crate::publisher::{HttpResponse, PublishOutcome, TransportKind};
use crate::store::AccountStore;
use crate::types::AccountState;

/// URL fragments that mark an authentication or challenge surface
const AUTH_MARKERS: &[&str] = &["login", "challenge", "checkpoint"];

/// Body fragments that mark a removed or banned account
const REMOVED_MARKERS: &[&str] = &["user_has_been_removed", "account_banned", "user not found"];

/// Message words that escalate a blocked action to quarantine
const SEVERITY_MARKERS: &[&str] = &["suspended", "disabled", "banned"];

/// What to do with the account after one publish attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Publish accepted; `post_id` extracted from the body when present
    Success { post_id: Option<String> },
    /// Transient; requeue the unit and back off
    Retry,
    /// Dead proxy or banned account; stop using this account
    Quarantine,
    /// Authentication challenge; credentials need operator refresh
    Block,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub action: Action,
    pub detail: String,
}

impl Classification {
    fn new(action: Action, detail: impl Into<String>) -> Self {
        Self {
            action,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.action, Action::Success { .. })
    }
}

/// Classify a raw publish outcome. Pure; no state is touched.
pub fn classify(outcome: &PublishOutcome) -> Classification {
    match outcome {
        PublishOutcome::Transport(failure) => match &failure.kind {
            // Rule 1: dead proxy or burned network path
            TransportKind::Proxy {
                retries_exhausted: true,
            } => Classification::new(
                Action::Quarantine,
                format!("proxy retries exhausted: {}", failure.detail),
            ),
            TransportKind::Tls => Classification::new(
                Action::Quarantine,
                format!("tls handshake failed: {}", failure.detail),
            ),
            TransportKind::Connect => Classification::new(
                Action::Quarantine,
                format!("connection failed: {}", failure.detail),
            ),
            // Rule 2: presumed transient
            _ => Classification::new(
                Action::Retry,
                format!("transport error: {}", failure.detail),
            ),
        },
        PublishOutcome::Response(response) => classify_response(response),
    }
}

fn classify_response(response: &HttpResponse) -> Classification {
    // Rule 3: the write endpoint only redirects to authentication or
    // challenge surfaces, so every redirect means stale credentials
    if response.is_redirect() {
        let target = response.location.as_deref().unwrap_or("(no location)");
        return Classification::new(
            Action::Block,
            format!("redirect ({}) to auth surface: {}", response.status, target),
        );
    }
    if let Some(final_url) = &response.final_url {
        if contains_any(final_url, AUTH_MARKERS) {
            return Classification::new(
                Action::Block,
                format!("landed on auth surface: {}", final_url),
            );
        }
    }

    // Rule 4: rate limited, back off rather than quarantine
    if response.status == 429 {
        return Classification::new(Action::Retry, "rate limited (429)");
    }

    // Rule 5: hard API failure or a body naming a removed/banned account
    if !response.is_success() {
        return Classification::new(
            Action::Quarantine,
            format!("api failure: status {}", response.status),
        );
    }
    if contains_any(&response.body, REMOVED_MARKERS) {
        return Classification::new(Action::Quarantine, "account removed or banned");
    }

    // Rule 6: 2xx but not the expected shape
    let Ok(body) = serde_json::from_str::<Value>(&response.body) else {
        return Classification::new(Action::Retry, "unparseable success body");
    };

    // Rule 7: explicit failure flag or blocked action in a parsed body
    let failed = body.get("status").and_then(Value::as_str) == Some("fail")
        || body.get("message").and_then(Value::as_str) == Some("feedback_required");
    if failed {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| body.get("feedback_message").and_then(Value::as_str))
            .unwrap_or("unspecified failure");
        if contains_any(message, SEVERITY_MARKERS) {
            return Classification::new(
                Action::Quarantine,
                format!("platform rejected account: {}", message),
            );
        }
        return Classification::new(Action::Retry, format!("platform rejected post: {}", message));
    }

    // Rule 8: accepted
    Classification::new(
        Action::Success {
            post_id: extract_post_id(&body),
        },
        "published",
    )
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// Pull the published content's identifier out of a parsed body.
fn extract_post_id(body: &Value) -> Option<String> {
    let id = body
        .get("media")
        .and_then(|m| m.get("id"))
        .or_else(|| body.get("media_id"))
        .or_else(|| body.get("id"))?;

    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Applies the side effects each classification mandates.
///
/// Quarantine and block transition the account and write a critical ledger
/// record before the action is handed back; retry writes a non-critical
/// record and leaves the account state alone.
pub struct Classifier {
    store: Arc<AccountStore>,
    ledger: Arc<FailureLedger>,
}

impl Classifier {
    pub fn new(store: Arc<AccountStore>, ledger: Arc<FailureLedger>) -> Self {
        Self { store, ledger }
    }

    pub fn classify_and_apply(
        &self,
        account: &str,
        unit_index: i64,
        outcome: &PublishOutcome,
    ) -> Classification {
        let classification = classify(outcome);

        match classification.action {
            Action::Success { .. } => {}
            Action::Retry => {
                info!(account, detail = %classification.detail, "transient failure, will retry");
                self.ledger
                    .record(account, unit_index, &classification.detail, false);
            }
            Action::Quarantine => {
                warn!(account, detail = %classification.detail, "quarantining account");
                self.apply_transition(account, AccountState::Quarantine, &classification.detail);
                self.ledger
                    .record(account, unit_index, &classification.detail, true);
            }
            Action::Block => {
                warn!(account, detail = %classification.detail, "account requires login");
                self.apply_transition(account, AccountState::RequireLogin, &classification.detail);
                self.ledger
                    .record(account, unit_index, &classification.detail, true);
            }
        }

        classification
    }

    fn apply_transition(&self, account: &str, state: AccountState, reason: &str) {
        match self.store.transition(account, state, reason) {
            Ok(true) => {}
            Ok(false) => warn!(account, "state transition target not in registry"),
            Err(e) => warn!(account, "failed to persist state transition: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{TransportFailure, TransportKind};
    use crate::types::{Account, AccountState};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn response(res: HttpResponse) -> PublishOutcome {
        PublishOutcome::Response(res)
    }

    fn transport(kind: TransportKind, detail: &str) -> PublishOutcome {
        PublishOutcome::Transport(TransportFailure::new(kind, detail))
    }

    #[test]
    fn test_proxy_retries_exhausted_quarantines() {
        let c = classify(&transport(
            TransportKind::Proxy {
                retries_exhausted: true,
            },
            "Max retries exceeded with url",
        ));
        assert_eq!(c.action, Action::Quarantine);
        assert!(c.detail.contains("proxy"));
    }

    #[test]
    fn test_tls_and_connect_quarantine() {
        assert_eq!(
            classify(&transport(TransportKind::Tls, "bad cert")).action,
            Action::Quarantine
        );
        assert_eq!(
            classify(&transport(TransportKind::Connect, "refused")).action,
            Action::Quarantine
        );
    }

    #[test]
    fn test_other_transport_retries() {
        assert_eq!(
            classify(&transport(TransportKind::Timeout, "30s elapsed")).action,
            Action::Retry
        );
        assert_eq!(
            classify(&transport(
                TransportKind::Proxy {
                    retries_exhausted: false
                },
                "proxy hiccup"
            ))
            .action,
            Action::Retry
        );
    }

    #[test]
    fn test_redirect_to_login_blocks() {
        let c = classify(&response(HttpResponse::redirect(
            302,
            "https://platform/accounts/login/",
        )));
        assert_eq!(c.action, Action::Block);
    }

    #[test]
    fn test_redirect_without_location_blocks() {
        let mut res = HttpResponse::status(302, "");
        res.location = None;
        assert_eq!(classify(&response(res)).action, Action::Block);
    }

    #[test]
    fn test_redirect_to_unrecognized_url_blocks() {
        // Redirects always mean stale credentials, whatever the target
        let c = classify(&response(HttpResponse::redirect(
            307,
            "https://platform/somewhere/else",
        )));
        assert_eq!(c.action, Action::Block);
    }

    #[test]
    fn test_final_url_checkpoint_blocks() {
        let mut res = HttpResponse::ok("{}");
        res.final_url = Some("https://platform/checkpoint/abc".to_string());
        assert_eq!(classify(&response(res)).action, Action::Block);
    }

    #[test]
    fn test_429_retries_even_with_banned_body() {
        // 429 precedes body inspection
        let c = classify(&response(HttpResponse::status(429, "account_banned")));
        assert_eq!(c.action, Action::Retry);
    }

    #[test]
    fn test_other_non_2xx_quarantines() {
        assert_eq!(
            classify(&response(HttpResponse::status(500, "oops"))).action,
            Action::Quarantine
        );
        assert_eq!(
            classify(&response(HttpResponse::status(403, ""))).action,
            Action::Quarantine
        );
    }

    #[test]
    fn test_removed_marker_in_2xx_body_quarantines() {
        let c = classify(&response(HttpResponse::ok(
            r#"{"status":"ok","message":"user_has_been_removed"}"#,
        )));
        assert_eq!(c.action, Action::Quarantine);
    }

    #[test]
    fn test_unparseable_2xx_retries() {
        let c = classify(&response(HttpResponse::ok("<html>half a page")));
        assert_eq!(c.action, Action::Retry);
    }

    #[test]
    fn test_fail_status_with_severity_quarantines() {
        let c = classify(&response(HttpResponse::ok(
            r#"{"status":"fail","message":"Your account has been suspended"}"#,
        )));
        assert_eq!(c.action, Action::Quarantine);
    }

    #[test]
    fn test_fail_status_without_severity_retries() {
        let c = classify(&response(HttpResponse::ok(
            r#"{"status":"fail","message":"Please wait a few minutes"}"#,
        )));
        assert_eq!(c.action, Action::Retry);
    }

    #[test]
    fn test_feedback_required_retries() {
        let c = classify(&response(HttpResponse::ok(
            r#"{"status":"ok","message":"feedback_required","feedback_message":"Try again later"}"#,
        )));
        assert_eq!(c.action, Action::Retry);
    }

    #[test]
    fn test_success_extracts_media_id() {
        let c = classify(&response(HttpResponse::ok(
            r#"{"status":"ok","media":{"id":"3141_5926"}}"#,
        )));
        assert_eq!(
            c.action,
            Action::Success {
                post_id: Some("3141_5926".to_string())
            }
        );
    }

    #[test]
    fn test_success_numeric_top_level_id() {
        let c = classify(&response(HttpResponse::ok(r#"{"status":"ok","id":98765}"#)));
        assert_eq!(
            c.action,
            Action::Success {
                post_id: Some("98765".to_string())
            }
        );
    }

    #[test]
    fn test_success_without_id() {
        let c = classify(&response(HttpResponse::ok(r#"{"status":"ok"}"#)));
        assert_eq!(c.action, Action::Success { post_id: None });
        assert!(c.is_success());
    }

    fn fixture(dir: &TempDir) -> (Arc<AccountStore>, Arc<FailureLedger>, Classifier) {
        let store = Arc::new(AccountStore::new(dir.path().join("accounts.json")));
        store
            .save(&[Account {
                name: "acct1".to_string(),
                credentials: HashMap::new(),
                proxy: None,
                group: "default".to_string(),
                enabled: true,
                state: AccountState::Alive,
                reason: None,
            }])
            .unwrap();
        let ledger = Arc::new(FailureLedger::new(dir.path().join("failures.json")));
        let classifier = Classifier::new(Arc::clone(&store), Arc::clone(&ledger));
        (store, ledger, classifier)
    }

    #[test]
    fn test_apply_quarantine_transitions_and_flushes() {
        let dir = TempDir::new().unwrap();
        let (store, ledger, classifier) = fixture(&dir);

        let c = classifier.classify_and_apply(
            "acct1",
            0,
            &transport(
                TransportKind::Proxy {
                    retries_exhausted: true,
                },
                "Max retries exceeded with url",
            ),
        );
        assert_eq!(c.action, Action::Quarantine);

        let accounts = store.load();
        assert_eq!(accounts[0].state, AccountState::Quarantine);
        assert!(accounts[0].reason.is_some());

        // Critical record is durable immediately
        assert_eq!(ledger.load().len(), 1);
        assert_eq!(ledger.buffered(), 0);
    }

    #[test]
    fn test_apply_block_sets_require_login() {
        let dir = TempDir::new().unwrap();
        let (store, _ledger, classifier) = fixture(&dir);

        classifier.classify_and_apply(
            "acct1",
            2,
            &response(HttpResponse::redirect(302, "https://platform/login")),
        );

        let accounts = store.load();
        assert_eq!(accounts[0].state, AccountState::RequireLogin);
    }

    #[test]
    fn test_apply_retry_leaves_state_and_buffers() {
        let dir = TempDir::new().unwrap();
        let (store, ledger, classifier) = fixture(&dir);

        classifier.classify_and_apply("acct1", 1, &response(HttpResponse::status(429, "")));

        assert_eq!(store.load()[0].state, AccountState::Alive);
        assert_eq!(ledger.buffered(), 1);
        assert!(ledger.load().is_empty());
    }

    #[test]
    fn test_apply_success_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let (store, ledger, classifier) = fixture(&dir);

        let c = classifier.classify_and_apply(
            "acct1",
            0,
            &response(HttpResponse::ok(r#"{"status":"ok","media":{"id":"1"}}"#)),
        );
        assert!(c.is_success());
        assert_eq!(store.load()[0].state, AccountState::Alive);
        assert_eq!(ledger.buffered(), 0);
    }
}
