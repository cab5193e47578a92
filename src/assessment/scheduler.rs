/*!
 * Local polling scheduler for the batch processor.
 *
 * Each tick reclaims stale claims, runs one batch, and re-runs immediately
 * (a bounded number of times) while pending jobs remain. Errors are logged
 * and the loop keeps going until the shutdown future resolves.
 */

use log::{error, info};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use super::processor::{BatchOutcome, BatchProcessor};

/// Totals of one scheduler tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Batch invocations in this tick
    pub runs: u32,
    pub processed: usize,
    pub failed: usize,
    /// Pending jobs after the last run
    pub remaining: i64,
}

impl TickSummary {
    fn add(&mut self, outcome: &BatchOutcome) {
        self.runs += 1;
        self.processed += outcome.processed;
        self.failed += outcome.failed;
        self.remaining = outcome.remaining;
    }
}

pub struct Scheduler {
    processor: Arc<BatchProcessor>,
    interval: Duration,
    batch_size: usize,
    max_catchup_runs: u32,
}

impl Scheduler {
    pub fn new(processor: Arc<BatchProcessor>) -> Self {
        let settings = processor.settings();
        Self {
            interval: Duration::from_secs(settings.interval_secs.max(1)),
            batch_size: settings.batch_size,
            max_catchup_runs: settings.max_catchup_runs,
            processor,
        }
    }

    /// Override the tick interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run ticks until `shutdown` resolves; returns the number of ticks
    pub async fn run<F>(&self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            "Scheduler started: every {:?}, batches of {}",
            self.interval, self.batch_size
        );

        let mut ticks = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let summary = self.tick().await;
                    ticks += 1;
                    if summary.processed + summary.failed > 0 {
                        info!(
                            "Tick {}: {} runs, {} processed, {} failed, {} remaining",
                            ticks, summary.runs, summary.processed, summary.failed, summary.remaining
                        );
                    }
                }
            }
        }

        info!("Scheduler stopped after {} ticks", ticks);
        ticks
    }

    /// One scheduler tick
    pub async fn tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();

        if let Err(e) = self.processor.reclaim_stale().await {
            error!("Reclaiming stale jobs failed: {}", e);
        }

        loop {
            match self.processor.process_batch(self.batch_size).await {
                Ok(outcome) => {
                    summary.add(&outcome);
                    let made_progress = outcome.processed + outcome.failed > 0;
                    if outcome.remaining == 0 || !made_progress || summary.runs > self.max_catchup_runs {
                        break;
                    }
                }
                Err(e) => {
                    error!("Batch run failed: {}", e);
                    break;
                }
            }
        }

        summary
    }
}
