//! Bulk export orchestrator.
//!
//! Runs one [`ExportJob`] through its state machine:
//!
//! ```text
//! Idle -> DirectFetch -> (short or error) -> Paginated -> [Confirming] -> Processing -> Complete
//!                     \-> (complete) --------------------------------/             \-> Failed
//! ```
//!
//! Pages are fetched one at a time in page order with a fixed delay between
//! requests. Progress is published on a watch channel and is reset to idle
//! when [`BulkExporter::run`] returns or its future is dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::csv::CsvAssembler;
use super::job::{ExportJob, ExportProgress, ExportState, ExportStrategy};
use super::source::PageSource;
use crate::error::{ExportError, SourceError};
use crate::listing::{ListResponse, QueryParams};

/// Default rows per paginated request.
pub const DEFAULT_PAGE_SIZE: u32 = 2_000;

/// Export tunables.
#[derive(Debug, Clone, Copy)]
pub struct ExportSettings {
    /// Rows requested per paginated fetch.
    pub page_size: u32,

    /// Pause between consecutive requests, including retries.
    pub request_delay: Duration,

    /// Extra attempts per page after the first failure.
    pub max_retries: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            request_delay: Duration::from_millis(250),
            max_retries: 2,
        }
    }
}

/// Decides whether an export that gathered fewer rows than expected goes on.
#[async_trait]
pub trait PartialExportPolicy: Send + Sync {
    async fn confirm(&self, received: usize, expected: u64) -> bool;
}

/// Always proceeds with whatever was gathered.
pub struct AcceptPartial;

#[async_trait]
impl PartialExportPolicy for AcceptPartial {
    async fn confirm(&self, _received: usize, _expected: u64) -> bool {
        true
    }
}

/// Never proceeds with a short export.
pub struct DeclinePartial;

#[async_trait]
impl PartialExportPolicy for DeclinePartial {
    async fn confirm(&self, _received: usize, _expected: u64) -> bool {
        false
    }
}

/// Result of a finished export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub job_id: Uuid,
    pub strategy: ExportStrategy,

    /// Total reported by the listing endpoint.
    pub expected_total: u64,

    /// Gathered rows, in page order.
    pub records: Vec<Value>,

    /// CSV rendering of `records`.
    pub csv: Vec<u8>,
}

impl ExportOutcome {
    pub fn is_partial(&self) -> bool {
        (self.records.len() as u64) < self.expected_total
    }
}

/// Drives export jobs against a [`PageSource`].
pub struct BulkExporter {
    source: Arc<dyn PageSource>,
    settings: ExportSettings,
    policy: Arc<dyn PartialExportPolicy>,
    progress: watch::Sender<ExportProgress>,
    cancel: CancellationToken,
}

/// Resets published progress to idle when dropped.
struct ProgressReset<'a>(&'a watch::Sender<ExportProgress>);

impl Drop for ProgressReset<'_> {
    fn drop(&mut self) {
        self.0.send_replace(ExportProgress::idle());
    }
}

impl BulkExporter {
    /// Create an exporter. Short exports are declined unless a policy
    /// set with [`with_policy`](Self::with_policy) accepts them.
    pub fn new(source: Arc<dyn PageSource>, settings: ExportSettings) -> Self {
        let (progress, _) = watch::channel(ExportProgress::idle());
        Self {
            source,
            settings,
            policy: Arc::new(DeclinePartial),
            progress,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn PartialExportPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Receiver for progress updates.
    pub fn subscribe(&self) -> watch::Receiver<ExportProgress> {
        self.progress.subscribe()
    }

    /// Token that aborts the running export when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a job to completion or failure.
    pub async fn run(&self, job: &mut ExportJob) -> Result<ExportOutcome, ExportError> {
        let _reset = ProgressReset(&self.progress);

        info!(job_id = %job.id, resource = %job.resource, "export started");
        let result = self.execute(job).await;

        match &result {
            Ok(outcome) => {
                job.state = ExportState::Complete;
                info!(
                    job_id = %job.id,
                    strategy = ?outcome.strategy,
                    rows = outcome.records.len(),
                    expected = outcome.expected_total,
                    "export complete"
                );
            }
            Err(e) => {
                job.state = ExportState::Failed;
                warn!(job_id = %job.id, error = %e, "export failed");
            }
        }

        result
    }

    async fn execute(&self, job: &mut ExportJob) -> Result<ExportOutcome, ExportError> {
        self.ensure_active()?;

        job.state = ExportState::DirectFetch;
        self.progress
            .send_replace(ExportProgress::processing(ExportStrategy::Direct, 0, 1));

        let direct = self
            .cancellable(self.source.fetch_page(job.resource, &job.direct_params()))
            .await?;

        match direct {
            Ok(response) if response.items.len() as u64 >= response.meta.total => {
                job.expected_total = response.meta.total;
                job.accumulated = response.items;
            }
            Ok(response) => {
                warn!(
                    job_id = %job.id,
                    received = response.items.len(),
                    expected = response.meta.total,
                    "direct export under-returned, paging instead"
                );
                job.expected_total = response.meta.total;
                self.paginate(job).await?;
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "direct export failed, paging instead");
                self.paginate(job).await?;
            }
        }

        if job.is_short() {
            job.state = ExportState::Confirming;
            let received = job.accumulated.len();
            if !self.policy.confirm(received, job.expected_total).await {
                return Err(ExportError::PartialDeclined {
                    received,
                    expected: job.expected_total,
                });
            }
            info!(job_id = %job.id, received, expected = job.expected_total, "partial export accepted");
        }

        job.state = ExportState::Processing;
        let strategy = job.strategy;
        self.progress
            .send_replace(ExportProgress::processing(strategy, 0, 1));

        let progress = &self.progress;
        let csv = CsvAssembler::new(job.resource)
            .assemble(&job.accumulated, &self.cancel, |done, total| {
                progress.send_replace(ExportProgress::processing(
                    strategy,
                    done as u64,
                    total as u64,
                ));
            })
            .await?;

        Ok(ExportOutcome {
            job_id: job.id,
            strategy,
            expected_total: job.expected_total,
            records: std::mem::take(&mut job.accumulated),
            csv,
        })
    }

    /// Gather every page in order, starting over from an empty set.
    async fn paginate(&self, job: &mut ExportJob) -> Result<(), ExportError> {
        job.switch_to_paginated();
        self.progress.send_replace(ExportProgress::fetching(0, 1));
        let page_size = self.settings.page_size.max(1);

        let mut page = 1u32;
        loop {
            self.pause().await?;

            let response = self.fetch_with_retry(job, page, page_size).await?;
            let last_page = u64::from(response.meta.last_page.max(1));
            let received = response.items.len();
            job.expected_total = response.meta.total;
            job.accumulated.extend(response.items);

            debug!(
                job_id = %job.id,
                page,
                last_page,
                received,
                accumulated = job.accumulated.len(),
                "export page fetched"
            );
            self.progress
                .send_replace(ExportProgress::fetching(u64::from(page), last_page));

            if u64::from(page) >= last_page || received == 0 {
                return Ok(());
            }
            page += 1;
        }
    }

    async fn fetch_with_retry(
        &self,
        job: &ExportJob,
        page: u32,
        page_size: u32,
    ) -> Result<ListResponse, ExportError> {
        let params: QueryParams = job.page_params(page, page_size);
        let attempts = self.settings.max_retries + 1;

        let mut attempt = 1;
        loop {
            match self
                .cancellable(self.source.fetch_page(job.resource, &params))
                .await?
            {
                Ok(response) => return Ok(response),
                Err(source) if attempt >= attempts || matches!(source, SourceError::Unauthorized) => {
                    return Err(ExportError::PageFailed {
                        page,
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    warn!(job_id = %job.id, page, attempt, error = %e, "export page failed, retrying");
                    attempt += 1;
                    self.pause().await?;
                }
            }
        }
    }

    /// Inter-request delay; returns early if cancelled.
    async fn pause(&self) -> Result<(), ExportError> {
        if self.settings.request_delay.is_zero() {
            return self.ensure_active();
        }
        self.cancellable(tokio::time::sleep(self.settings.request_delay))
            .await
    }

    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, ExportError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExportError::Cancelled),
            out = fut => Ok(out),
        }
    }

    fn ensure_active(&self) -> Result<(), ExportError> {
        if self.cancel.is_cancelled() {
            Err(ExportError::Cancelled)
        } else {
            Ok(())
        }
    }
}
