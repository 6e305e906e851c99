//! The publish boundary
//!
//! Everything platform-specific (endpoints, headers, payload shapes) lives
//! behind [`ContentPublisher`]. The core hands it a credential bundle, a
//! proxy descriptor, and a content unit, and gets back a raw
//! [`PublishOutcome`] that the classifier interprets. Exceptions in the
//! wire layer never cross this boundary: transport failures come back as
//! tagged [`TransportFailure`] values.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::types::{Account, ContentUnit};

/// Transport-level failure category
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKind {
    /// Proxy failure; `retries_exhausted` marks a dead proxy rather than a hiccup
    Proxy { retries_exhausted: bool },
    /// TLS/SSL handshake failure
    Tls,
    /// Generic connection failure
    Connect,
    Timeout,
    Other,
}

#[derive(Debug, Clone)]
pub struct TransportFailure {
    pub kind: TransportKind,
    pub detail: String,
}

impl TransportFailure {
    pub fn new(kind: TransportKind, detail: &str) -> Self {
        Self {
            kind,
            detail: detail.to_string(),
        }
    }
}

/// An HTTP response as seen at the boundary, redirects not followed
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// `Location` header on a redirect
    pub location: Option<String>,
    /// URL the request ultimately landed on, when known
    pub final_url: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: &str) -> Self {
        Self {
            status: 200,
            location: None,
            final_url: None,
            body: body.to_string(),
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            location: None,
            final_url: None,
            body: body.to_string(),
        }
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self {
            status,
            location: Some(location.to_string()),
            final_url: None,
            body: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }
}

/// Raw result of one publish or read attempt
#[derive(Debug, Clone)]
pub enum PublishOutcome {
    Response(HttpResponse),
    Transport(TransportFailure),
}

/// Performs the actual network calls for one content unit.
///
/// Implementations own all protocol details. The core calls `publish`
/// once per attempt, `fetch_post` / `probe_post_url` only during
/// post-publish verification.
#[async_trait]
pub trait ContentPublisher: Send + Sync {
    /// Publish one content unit on behalf of `account`.
    async fn publish(&self, account: &Account, unit: &ContentUnit) -> PublishOutcome;

    /// Query the platform's read endpoint for a published post id.
    async fn fetch_post(&self, account: &Account, post_id: &str) -> PublishOutcome;

    /// Last-resort direct probe of the post's public URL.
    /// Returns `true` when the post appears to exist.
    async fn probe_post_url(&self, account: &Account, post_id: &str) -> bool;
}

// ============================================================================
// Mock publisher
// ============================================================================
//
// Available in all builds (not just tests) so integration tests and the
// daemon's dry-run mode can script outcomes without network access.

/// Scriptable in-memory publisher for tests and dry runs
///
/// Outcomes are drained front-to-back from per-method queues; an empty
/// queue yields a canned success. Every published caption is recorded for
/// later assertions.
pub struct MockPublisher {
    publish_script: Mutex<VecDeque<PublishOutcome>>,
    fetch_script: Mutex<VecDeque<PublishOutcome>>,
    probe_script: Mutex<VecDeque<bool>>,
    published: Mutex<Vec<(String, String)>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self {
            publish_script: Mutex::new(VecDeque::new()),
            fetch_script: Mutex::new(VecDeque::new()),
            probe_script: Mutex::new(VecDeque::new()),
            published: Mutex::new(Vec::new()),
        }
    }

    /// Canned 200 body carrying a post id, matching the shape the
    /// classifier extracts ids from.
    pub fn success_body(post_id: &str) -> String {
        serde_json::json!({ "status": "ok", "media": { "id": post_id } }).to_string()
    }

    pub fn push_publish(&self, outcome: PublishOutcome) {
        self.publish_script.lock().unwrap().push_back(outcome);
    }

    pub fn push_fetch(&self, outcome: PublishOutcome) {
        self.fetch_script.lock().unwrap().push_back(outcome);
    }

    pub fn push_probe(&self, exists: bool) {
        self.probe_script.lock().unwrap().push_back(exists);
    }

    /// (account, caption) pairs in publish order
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

impl Default for MockPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentPublisher for MockPublisher {
    async fn publish(&self, account: &Account, unit: &ContentUnit) -> PublishOutcome {
        self.published
            .lock()
            .unwrap()
            .push((account.name.clone(), unit.caption.clone()));

        self.publish_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                PublishOutcome::Response(HttpResponse::ok(&Self::success_body("mock-post")))
            })
    }

    async fn fetch_post(&self, _account: &Account, post_id: &str) -> PublishOutcome {
        self.fetch_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                PublishOutcome::Response(HttpResponse::ok(&Self::success_body(post_id)))
            })
    }

    async fn probe_post_url(&self, _account: &Account, _post_id: &str) -> bool {
        self.probe_script.lock().unwrap().pop_front().unwrap_or(true)
    }
}
