//! Per-account control loop
//!
//! One worker owns one account for the lifetime of a run. Each iteration:
//! select a unit, publish, classify, transition state, persist, delay.
//! The worker exits on a terminal account state or a stop request; it
//! never touches another account's state.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::classify::{Action, Classifier};
use crate::config::{RunnerConfig, SelectionMode};
use crate::delay::{next_delay, RetryBackoff};
use crate::ledger::FailureLedger;
use crate::publisher::ContentPublisher;
use crate::stop::StopFlag;
use crate::store::AccountStore;
use crate::types::{Account, AccountState, ContentUnit, DelayConfig};
use crate::verify::verify_published;

pub struct AccountWorker {
    account: Account,
    units: Vec<ContentUnit>,
    publisher: Arc<dyn ContentPublisher>,
    store: Arc<AccountStore>,
    ledger: Arc<FailureLedger>,
    classifier: Classifier,
    delay_config: Arc<RwLock<DelayConfig>>,
    runner: RunnerConfig,
    stop: StopFlag,
    backoff: RetryBackoff,
    pending: VecDeque<usize>,
    requeues: HashMap<usize, u32>,
}

impl AccountWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account: Account,
        units: Vec<ContentUnit>,
        publisher: Arc<dyn ContentPublisher>,
        store: Arc<AccountStore>,
        ledger: Arc<FailureLedger>,
        delay_config: Arc<RwLock<DelayConfig>>,
        runner: RunnerConfig,
        stop: StopFlag,
    ) -> Self {
        let classifier = Classifier::new(Arc::clone(&store), Arc::clone(&ledger));
        Self {
            account,
            units,
            publisher,
            store,
            ledger,
            classifier,
            delay_config,
            runner,
            stop,
            backoff: RetryBackoff::new(),
            pending: VecDeque::new(),
            requeues: HashMap::new(),
        }
    }

    /// Run until a terminal state or a stop request.
    pub async fn run(mut self) {
        let name = self.account.name.clone();
        info!(account = %name, units = self.units.len(), "worker starting");

        if self.units.iter().all(|unit| !unit.active) {
            warn!(account = %name, "no active content units, worker exiting");
            return;
        }

        while self.stop.is_running() {
            let Some(index) = self.select_unit() else {
                // Queue drained; restart the cycle for sustained posting
                debug!(account = %name, "content cycle complete, restarting");
                self.requeues.clear();
                self.pending = (0..self.units.len()).collect();
                continue;
            };

            let unit = &self.units[index];
            if !unit.active {
                debug!(account = %name, unit = index, "unit inactive, skipping");
                continue;
            }

            let outcome = self.publisher.publish(&self.account, unit).await;
            let classification = self
                .classifier
                .classify_and_apply(&name, index as i64, &outcome);

            match classification.action {
                Action::Quarantine | Action::Block => {
                    info!(account = %name, detail = %classification.detail, "terminal state, worker exiting");
                    return;
                }
                Action::Retry => {
                    self.requeue(index);
                    self.backoff.record_failure();
                    let minutes = self.backoff.recovery_delay(&self.runner);
                    debug!(account = %name, minutes, "recovery delay after transient failure");
                    if !self.stop.sleep(Duration::from_secs(minutes * 60)).await {
                        break;
                    }
                }
                Action::Success { ref post_id } => {
                    if let Some(post_id) = post_id {
                        if !self.confirm_post(post_id, index).await {
                            return;
                        }
                    }
                    self.backoff.reset();

                    let config = { *self.delay_config.read().unwrap() };
                    let minutes = next_delay(&self.units[index], &config);
                    debug!(account = %name, minutes, "waiting before next publish");
                    if !self.stop.sleep(Duration::from_secs(minutes * 60)).await {
                        break;
                    }
                }
            }
        }

        info!(account = %name, "worker stopping on request");
    }

    /// Next unit index, or `None` when the sequential queue has drained.
    fn select_unit(&mut self) -> Option<usize> {
        match self.runner.selection {
            SelectionMode::Sequential => {
                if self.pending.is_empty() && self.requeues.is_empty() {
                    // First iteration of a fresh worker
                    self.pending = (0..self.units.len()).collect();
                }
                self.pending.pop_front()
            }
            SelectionMode::Random => {
                let mut rng = rand::thread_rng();
                Some(rng.gen_range(0..self.units.len()))
            }
        }
    }

    /// Re-enqueue a transiently failed unit, up to the configured bound.
    fn requeue(&mut self, index: usize) {
        let count = self.requeues.entry(index).or_insert(0);
        *count += 1;

        if *count > self.runner.max_requeues {
            warn!(account = %self.account.name, unit = index, "unit dropped after repeated transient failures");
            self.ledger.record(
                &self.account.name,
                index as i64,
                &format!("unit dropped after {} requeues", self.runner.max_requeues),
                false,
            );
            return;
        }

        if self.runner.selection == SelectionMode::Sequential {
            self.pending.push_back(index);
        }
    }

    /// Tolerant verification; a hard failure quarantines the account.
    async fn confirm_post(&self, post_id: &str, index: usize) -> bool {
        let wait = Duration::from_secs(self.runner.verify_retry_wait_secs);
        let confirmed =
            verify_published(&*self.publisher, &self.account, post_id, wait, &self.stop).await;

        if confirmed {
            return true;
        }

        let detail = format!("published post {} not found on verification", post_id);
        warn!(account = %self.account.name, detail = %detail, "quarantining after failed verification");
        if let Err(e) =
            self.store
                .transition(&self.account.name, AccountState::Quarantine, &detail)
        {
            warn!(account = %self.account.name, "failed to persist quarantine: {}", e);
        }
        self.ledger
            .record(&self.account.name, index as i64, &detail, true);
        false
    }
}
