//! CSV assembly for exported rows.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ExportError;
use crate::listing::Resource;
use crate::records;

/// Rows converted between yield points, scaled by export size.
pub fn batch_size(total: usize) -> usize {
    match total {
        0..=1_000 => 100,
        1_001..=10_000 => 500,
        10_001..=50_000 => 1_000,
        _ => 2_000,
    }
}

/// Writes rows as CSV using a resource's export columns.
#[derive(Debug, Clone, Copy)]
pub struct CsvAssembler {
    resource: Resource,
}

impl CsvAssembler {
    pub fn new(resource: Resource) -> Self {
        Self { resource }
    }

    /// Header row.
    pub fn headers(&self) -> Vec<&'static str> {
        self.resource
            .spec()
            .export_columns
            .iter()
            .map(|c| c.header)
            .collect()
    }

    /// Convert `rows` to CSV bytes in batches, yielding to the runtime
    /// between batches. `on_progress` receives `(rows_done, rows_total)`
    /// after each batch.
    pub async fn assemble<F>(
        &self,
        rows: &[Value],
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<Vec<u8>, ExportError>
    where
        F: FnMut(usize, usize) + Send,
    {
        let columns = self.resource.spec().export_columns;
        let mut writer = ::csv::Writer::from_writer(Vec::new());
        writer.write_record(self.headers())?;

        let total = rows.len();
        let mut done = 0;
        for batch in rows.chunks(batch_size(total)) {
            if cancel.is_cancelled() {
                return Err(ExportError::Cancelled);
            }

            for row in batch {
                let row = records::normalize(self.resource, row);
                let record: Vec<String> = columns
                    .iter()
                    .map(|c| row.get(c.field).map(json_value_to_csv_string).unwrap_or_default())
                    .collect();
                writer.write_record(&record)?;
            }

            done += batch.len();
            on_progress(done, total);
            tokio::task::yield_now().await;
        }

        writer
            .into_inner()
            .map_err(|e| ExportError::Output(e.to_string()))
    }
}

/// Convert a JSON value to a CSV cell.
fn json_value_to_csv_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(arr) => arr
            .iter()
            .map(json_value_to_csv_string)
            .collect::<Vec<_>>()
            .join(";"),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
