//! Replacement across a selection of scanned records.
//!
//! Records are rewritten in batches: every record of a batch runs
//! concurrently and the next batch starts once the current one is drained.
//! One failing record never stops the run; it is counted and reported.

use crate::config::ReplaceOptions;
use crate::error::{EngineError, ErrorKind};
use crate::model::{AggregatedRecord, ReplaceProgress};
use crate::replace::ReplaceEngine;
use crate::report::ReplaceSummary;
use crate::session::ScanSession;
use crate::store::RecordStore;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceTarget {
    All,
    Selected(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Confirming,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFailure {
    pub record_id: String,
    pub title: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceReport {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub failures: Vec<RecordFailure>,
}

impl ReplaceReport {
    pub fn summary(&self) -> ReplaceSummary {
        ReplaceSummary {
            completed: self.completed,
            failed: self.failed,
        }
    }
}

#[derive(Debug)]
struct PendingRun {
    records: Vec<AggregatedRecord>,
    replacement: String,
}

pub struct BatchOrchestrator {
    batch_size: usize,
    state: BatchState,
    pending: Option<PendingRun>,
    progress: watch::Sender<ReplaceProgress>,
}

impl BatchOrchestrator {
    pub fn new(batch_size: usize) -> Self {
        let (progress, _) = watch::channel(ReplaceProgress::default());
        Self {
            batch_size: batch_size.max(1),
            state: BatchState::Idle,
            pending: None,
            progress,
        }
    }

    pub fn from_options(options: &ReplaceOptions) -> Self {
        Self::new(options.batch_size)
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<ReplaceProgress> {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> ReplaceProgress {
        *self.progress.borrow()
    }

    /// Records waiting for confirmation.
    pub fn pending_count(&self) -> usize {
        self.pending
            .as_ref()
            .map(|run| run.records.len())
            .unwrap_or(0)
    }

    /// Resolves `target` against the records of `session` that were not
    /// replaced yet and waits for confirmation. An empty replacement deletes
    /// the matches; a missing one is rejected.
    pub fn request(
        &mut self,
        session: &ScanSession,
        target: ReplaceTarget,
        replacement: Option<String>,
    ) -> Result<usize, EngineError> {
        if self.state == BatchState::Running {
            return Err(EngineError::InvalidState(
                "a replace run is already in progress".into(),
            ));
        }
        let replacement = replacement.ok_or(EngineError::MissingReplacement)?;

        let records: Vec<AggregatedRecord> = match &target {
            ReplaceTarget::All => session.pending().cloned().collect(),
            ReplaceTarget::Selected(ids) => {
                let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
                session
                    .pending()
                    .filter(|record| wanted.contains(record.record_id.as_str()))
                    .cloned()
                    .collect()
            }
        };
        if records.is_empty() {
            return Err(EngineError::EmptySelection);
        }

        let count = records.len();
        self.pending = Some(PendingRun {
            records,
            replacement,
        });
        self.state = BatchState::Confirming;
        Ok(count)
    }

    pub fn cancel(&mut self) {
        if self.state == BatchState::Confirming {
            self.pending = None;
            self.state = BatchState::Idle;
        }
    }

    /// Runs the confirmed request. Records rewritten successfully are marked
    /// as replaced in `session`.
    pub async fn confirm<S>(
        &mut self,
        store: &S,
        session: &mut ScanSession,
    ) -> Result<ReplaceReport, EngineError>
    where
        S: RecordStore + ?Sized,
    {
        if self.state != BatchState::Confirming {
            return Err(EngineError::InvalidState(
                "nothing to confirm, request a replace first".into(),
            ));
        }
        let Some(run) = self.pending.take() else {
            self.state = BatchState::Idle;
            return Err(EngineError::InvalidState("no pending replace".into()));
        };

        self.state = BatchState::Running;
        let total = run.records.len();
        self.progress.send_replace(ReplaceProgress::started(total));
        info!(
            "Replacing in {total} record(s), {} at a time",
            self.batch_size
        );

        let pattern = session.pattern().clone();
        let engine = ReplaceEngine::new(&pattern, &run.replacement);
        let mut report = ReplaceReport {
            total,
            ..ReplaceReport::default()
        };

        for batch in run.records.chunks(self.batch_size) {
            let engine = &engine;
            let mut running: FuturesUnordered<_> = batch
                .iter()
                .map(|record| async move { (record, engine.replace_record(store, record).await) })
                .collect();

            let mut replaced = Vec::new();
            while let Some((record, result)) = running.next().await {
                match result {
                    Ok(_) => {
                        report.completed += 1;
                        replaced.push(record.record_id.clone());
                    }
                    Err(err) => {
                        warn!("replace failed for record {}: {err}", record.record_id);
                        report.failed += 1;
                        report.failures.push(RecordFailure {
                            record_id: record.record_id.clone(),
                            title: record.title.clone(),
                            kind: err.kind(),
                            message: err.to_string(),
                        });
                    }
                }
                self.publish(report.completed, report.failed);
            }
            drop(running);

            for record_id in &replaced {
                session.mark_replaced(record_id);
            }
        }

        self.progress.send_modify(|progress| progress.in_progress = false);
        self.state = BatchState::Idle;
        info!("{}", report.summary().message());
        Ok(report)
    }

    fn publish(&self, completed: usize, failed: usize) {
        self.progress.send_modify(|progress| {
            progress.completed = completed;
            progress.failed = failed;
            progress.in_progress = progress.finished() < progress.total;
        });
    }
}
