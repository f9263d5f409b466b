//! Incremental crawl-merge loop.
//!
//! Walks a list of ids, fetches only what the completeness predicate says
//! is missing, merges each patch into the dataset and checkpoints the whole
//! file after every record. A run that is interrupted or killed loses at
//! most the record being fetched.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::FetchError;
use crate::log::EventLog;
use crate::model::{Record, RecordPatch};
use crate::store::{Dataset, DatasetStore};

/// Produces the patch for one id.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    /// `existing` is the stored record, if any.
    async fn fetch(&self, id: &str, existing: Option<&Record>) -> Result<RecordPatch, FetchError>;
}

/// Pause between two fetches, decided once per run.
#[allow(async_fn_in_trait)]
pub trait DelayPolicy {
    async fn delay(&self) -> Duration;
}

impl DelayPolicy for Duration {
    async fn delay(&self) -> Duration {
        *self
    }
}

/// Receiving side of the stop flag.
#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

/// Sending side of the stop flag.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: watch::Sender<bool>,
}

pub fn interrupt_channel() -> (InterruptHandle, Interrupt) {
    let (tx, rx) = watch::channel(false);
    (InterruptHandle { tx }, Interrupt { rx })
}

impl InterruptHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Triggers on the first Ctrl-C. Must be called inside a tokio runtime.
    pub fn on_ctrl_c(self) {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                self.trigger();
            }
        });
    }
}

impl Interrupt {
    /// A flag nobody can raise.
    pub fn never() -> Self {
        interrupt_channel().1
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleeps for `duration` or until triggered. Returns whether it was triggered.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }

        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return self.is_triggered(),
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        // sender gone, nothing can interrupt any more
                        (&mut sleep).await;
                        return self.is_triggered();
                    }
                    if self.is_triggered() {
                        return true;
                    }
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub dataset: Dataset,
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
    pub not_found: usize,
    pub persist_failures: usize,
    pub interrupted: bool,
}

impl RunReport {
    pub fn attempted(&self) -> usize {
        self.fetched + self.failed + self.not_found
    }
}

pub struct CrawlEngine<F, D, P> {
    store: DatasetStore,
    fetcher: F,
    delay: D,
    is_complete: P,
    log: EventLog,
    interrupt: Interrupt,
    limit: Option<usize>,
    default_license: Option<String>,
}

impl<F, D, P> CrawlEngine<F, D, P>
where
    F: Fetcher,
    D: DelayPolicy,
    P: Fn(&Record) -> bool,
{
    pub fn new(store: DatasetStore, fetcher: F, delay: D, is_complete: P, log: EventLog) -> Self {
        Self {
            store,
            fetcher,
            delay,
            is_complete,
            log,
            interrupt: Interrupt::never(),
            limit: None,
            default_license: None,
        }
    }

    /// Stop after this many fetch attempts.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// License set on fetched records that have none.
    pub fn with_default_license(mut self, license: impl Into<String>) -> Self {
        self.default_license = Some(license.into());
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub async fn run(&self, target_ids: &[String]) -> RunReport {
        let mut interrupt = self.interrupt.clone();
        let mut report = RunReport {
            dataset: self.store.load_or_quarantine(&self.log),
            ..RunReport::default()
        };

        let mut seen = HashSet::new();
        let targets: Vec<&str> = target_ids
            .iter()
            .map(String::as_str)
            .filter(|id| seen.insert(*id))
            .collect();
        let total = targets.len();

        let delay = self.delay.delay().await;
        self.log
            .write(format!("Crawl delay: {}s, targets: {total}", delay.as_secs_f64()));

        let mut backed_up = false;

        for (i, id) in targets.iter().copied().enumerate() {
            let pos = i + 1;

            if interrupt.is_triggered() {
                report.interrupted = true;
                break;
            }

            if report.dataset.get(id).is_some_and(|r| (self.is_complete)(r)) {
                self.log.write(format!("SKIP ({pos}/{total}): {id} (already complete)"));
                report.skipped += 1;
                continue;
            }

            if self.limit.is_some_and(|limit| report.attempted() >= limit) {
                self.log.write(format!("Limit of {} reached, stopping", report.attempted()));
                break;
            }

            self.log.write(format!("Fetching ({pos}/{total}): {id}"));

            let fetched = self.fetcher.fetch(id, report.dataset.get(id)).await;
            match fetched {
                Ok(patch) => {
                    let record = report.dataset.upsert(id, patch);
                    if record.license.is_none() {
                        record.license = self.default_license.clone();
                    }
                    report.fetched += 1;

                    if !backed_up {
                        backed_up = true;
                        match self.store.backup() {
                            Ok(true) => self.log.write(format!(
                                "Backup written to {}",
                                self.store.paths().backup.display()
                            )),
                            Ok(false) => {}
                            Err(e) => self.log.write(format!("Failed to write backup: {e}")),
                        }
                    }

                    match self.store.save(&report.dataset) {
                        Ok(()) => self.log.write(format!(
                            "Checkpoint saved ({} records)",
                            report.dataset.len()
                        )),
                        Err(e) => {
                            report.persist_failures += 1;
                            self.log.write(format!("Failed to write checkpoint: {e}"));
                        }
                    }
                }
                Err(e) if e.is_no_content() => {
                    report.not_found += 1;
                    self.log.write(format!("No content for {id}: {e}"));
                }
                Err(e) => {
                    report.failed += 1;
                    self.log.write(format!("Error fetching {id}: {e}"));
                }
            }

            if pos < total && interrupt.sleep(delay).await {
                report.interrupted = true;
                break;
            }
        }

        // a stop raised during the final fetch has no later check to see it
        if interrupt.is_triggered() {
            report.interrupted = true;
        }

        if report.interrupted {
            self.log.write("Interrupted, last checkpoint kept. Exiting.");
        }

        report
    }
}
