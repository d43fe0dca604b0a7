//! Export job types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::listing::{QueryParams, Resource};

/// How rows are being gathered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStrategy {
    /// One `export=true` request for the whole filtered set.
    Direct,

    /// Sequential fixed-size page requests.
    Paginated,
}

/// Export state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    Idle,
    DirectFetch,
    Paginated,

    /// Short export waiting on the partial-export policy.
    Confirming,

    Processing,
    Complete,
    Failed,
}

/// Which part of the export the progress value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportPhase {
    #[default]
    Idle,
    Fetching,
    Processing,
}

/// Published export progress.
///
/// Paginated exports report fetching in 0-50 and processing in 50-100;
/// direct exports report processing only, over 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExportProgress {
    pub phase: ExportPhase,

    /// Percentage complete (0-100).
    pub percent: u8,
}

impl ExportProgress {
    pub fn idle() -> Self {
        Self::default()
    }

    /// Progress after `pages_done` of `pages_total` paginated fetches.
    pub fn fetching(pages_done: u64, pages_total: u64) -> Self {
        Self {
            phase: ExportPhase::Fetching,
            percent: scaled(pages_done, pages_total, 0, 50),
        }
    }

    /// Progress after `done` of `total` rows were converted.
    pub fn processing(strategy: ExportStrategy, done: u64, total: u64) -> Self {
        let (floor, span) = match strategy {
            ExportStrategy::Direct => (0, 100),
            ExportStrategy::Paginated => (50, 50),
        };
        Self {
            phase: ExportPhase::Processing,
            percent: scaled(done, total, floor, span),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase == ExportPhase::Idle
    }
}

fn scaled(done: u64, total: u64, floor: u8, span: u8) -> u8 {
    if total == 0 {
        return floor.saturating_add(span);
    }
    let fraction = done.min(total) as f64 / total as f64;
    floor.saturating_add((fraction * f64::from(span)) as u8)
}

/// One bulk export invocation.
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Unique job ID.
    pub id: Uuid,

    pub resource: Resource,

    /// Filters frozen when the job was created.
    filter_snapshot: QueryParams,

    pub strategy: ExportStrategy,

    pub state: ExportState,

    /// Total reported by the listing endpoint.
    pub expected_total: u64,

    /// Rows gathered so far, in page order.
    pub accumulated: Vec<serde_json::Value>,
}

impl ExportJob {
    /// Create a job; paging and export keys are stripped from `params`.
    pub fn new(resource: Resource, params: &QueryParams) -> Self {
        Self {
            id: Uuid::now_v7(),
            resource,
            filter_snapshot: params.filter_snapshot(),
            strategy: ExportStrategy::Direct,
            state: ExportState::Idle,
            expected_total: 0,
            accumulated: Vec::new(),
        }
    }

    pub fn filter_snapshot(&self) -> &QueryParams {
        &self.filter_snapshot
    }

    /// Parameters for the single direct request.
    pub fn direct_params(&self) -> QueryParams {
        self.filter_snapshot.clone().with("export", "true")
    }

    /// Parameters for one paginated request.
    pub fn page_params(&self, page: u32, page_size: u32) -> QueryParams {
        self.filter_snapshot
            .clone()
            .with("page", page.to_string())
            .with("limit", page_size.to_string())
    }

    /// Fall back to paging; accumulation restarts from empty.
    pub fn switch_to_paginated(&mut self) {
        self.strategy = ExportStrategy::Paginated;
        self.state = ExportState::Paginated;
        self.accumulated.clear();
    }

    /// Whether fewer rows were gathered than the endpoint reported.
    pub fn is_short(&self) -> bool {
        (self.accumulated.len() as u64) < self.expected_total
    }
}
