//! Bulk export.
//!
//! This module provides:
//! - ExportJob: one export invocation with its frozen filter snapshot
//! - BulkExporter: the direct/paginated state machine with progress reporting
//! - PageSource: HTTP and in-process listing calls
//! - CsvAssembler: batched CSV conversion

pub mod csv;
mod job;
mod orchestrator;
mod source;

pub use self::csv::CsvAssembler;
pub use job::{ExportJob, ExportPhase, ExportProgress, ExportState, ExportStrategy};
pub use orchestrator::{
    AcceptPartial, BulkExporter, DEFAULT_PAGE_SIZE, DeclinePartial, ExportOutcome, ExportSettings,
    PartialExportPolicy,
};
pub use source::{HttpPageSource, PageSource, ServicePageSource};
