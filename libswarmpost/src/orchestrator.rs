//! Run supervision
//!
//! The orchestrator owns the shared state for one run: the account store,
//! the failure ledger, the pacing configuration, and the stop flag. It
//! fans out one worker task per eligible account with a randomized
//! startup stagger, keeps the ledger's periodic flush running, and joins
//! everything on shutdown.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{Config, RunnerConfig};
use crate::content::ContentLibrary;
use crate::error::Result;
use crate::ledger::FailureLedger;
use crate::publisher::ContentPublisher;
use crate::stop::StopFlag;
use crate::store::AccountStore;
use crate::types::DelayConfig;
use crate::worker::AccountWorker;

pub struct Orchestrator {
    store: Arc<AccountStore>,
    ledger: Arc<FailureLedger>,
    library: ContentLibrary,
    publisher: Arc<dyn ContentPublisher>,
    delay_config: Arc<RwLock<DelayConfig>>,
    runner: RunnerConfig,
    stop: StopFlag,
}

impl Orchestrator {
    pub fn new(config: &Config, publisher: Arc<dyn ContentPublisher>) -> Self {
        Self {
            store: Arc::new(AccountStore::new(&config.storage.accounts_file)),
            ledger: Arc::new(FailureLedger::new(&config.storage.failures_file)),
            library: ContentLibrary::new(&config.storage.content_dir),
            publisher,
            delay_config: Arc::new(RwLock::new(config.pacing)),
            runner: config.runner.clone(),
            stop: StopFlag::new(),
        }
    }

    /// The shared run flag, for signal handlers and embedding consoles.
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Request a cooperative stop; workers exit at their next sleep check.
    pub fn stop(&self) {
        info!("stop requested");
        self.stop.stop();
    }

    /// Live pacing reconfiguration.
    ///
    /// Inverted bounds are swapped and clamped to at least one minute.
    /// Takes effect on each worker's next delay computation.
    pub fn update_delay_config(&self, min_minutes: u32, max_minutes: u32, use_individual: bool) {
        let mut config = self.delay_config.write().unwrap();
        config.set_range(min_minutes, max_minutes);
        config.use_individual_delays = use_individual;
        info!(
            min = config.min_minutes,
            max = config.max_minutes,
            individual = config.use_individual_delays,
            "pacing reconfigured"
        );
    }

    /// Run to completion: fan out workers, supervise, final flush.
    pub async fn run(&self) -> Result<()> {
        let accounts = self.store.load();
        let eligible: Vec<_> = accounts.into_iter().filter(|a| a.is_eligible()).collect();

        if eligible.is_empty() {
            warn!("no eligible accounts, nothing to do");
            return Ok(());
        }
        info!(count = eligible.len(), "starting workers");

        let flush_task = tokio::spawn(
            Arc::clone(&self.ledger).run_periodic_flush(self.stop.clone()),
        );

        let mut workers: Vec<(String, JoinHandle<()>)> = Vec::new();
        for account in eligible {
            if !self.stop.is_running() {
                break;
            }

            let units = self.library.load_group(&account.group);
            if units.is_empty() {
                warn!(account = %account.name, group = %account.group, "empty content group, skipping account");
                continue;
            }

            if !workers.is_empty() && !self.stagger().await {
                break;
            }

            let name = account.name.clone();
            let worker = AccountWorker::new(
                account,
                units,
                Arc::clone(&self.publisher),
                Arc::clone(&self.store),
                Arc::clone(&self.ledger),
                Arc::clone(&self.delay_config),
                self.runner.clone(),
                self.stop.clone(),
            );
            workers.push((name, tokio::spawn(worker.run())));
        }

        for (name, handle) in workers {
            if let Err(e) = handle.await {
                error!(account = %name, "worker terminated abnormally: {}", e);
                self.ledger.record(
                    &name,
                    -1,
                    &format!("worker terminated abnormally: {}", e),
                    true,
                );
            }
        }

        // All workers are done; release the flush task and drain the buffer
        self.stop.stop();
        if let Err(e) = flush_task.await {
            error!("flush task terminated abnormally: {}", e);
        }
        self.ledger.flush()?;

        info!("run complete");
        Ok(())
    }

    /// Randomized startup spacing so the first requests never burst.
    async fn stagger(&self) -> bool {
        let lo = self.runner.stagger_min_secs.min(self.runner.stagger_max_secs);
        let hi = self.runner.stagger_max_secs.max(self.runner.stagger_min_secs);
        let secs = rand::thread_rng().gen_range(lo..=hi);
        self.stop.sleep(Duration::from_secs(secs)).await
    }
}
