use std::sync::Arc;

use chronicle_core::{AppError, AppResult};
use chronicle_domain::{AuditRecordId, AuditRecordView, ExportSchema, csv};
use futures::stream::{self, BoxStream, StreamExt};
use tracing::debug;

use crate::{AuditFilter, AuditListQuery, AuditPage, AuditStore};

/// Default number of rows read per export round-trip.
pub const DEFAULT_EXPORT_BATCH_SIZE: usize = 1000;

/// Read side of the audit log: paginated listing, point reads and CSV export.
#[derive(Clone)]
pub struct AuditQueryService {
    store: Arc<dyn AuditStore>,
    schema: ExportSchema,
    export_batch_size: usize,
}

enum ExportState {
    Header,
    Rows { before: Option<AuditRecordId> },
    Done,
}

impl AuditQueryService {
    /// Creates a query service exporting with the current schema.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            schema: ExportSchema::current(),
            export_batch_size: DEFAULT_EXPORT_BATCH_SIZE,
        }
    }

    /// Overrides the export batch size; zero falls back to the default.
    #[must_use]
    pub fn with_export_batch_size(mut self, export_batch_size: usize) -> Self {
        self.export_batch_size = if export_batch_size == 0 {
            DEFAULT_EXPORT_BATCH_SIZE
        } else {
            export_batch_size
        };
        self
    }

    /// Overrides the export schema.
    #[must_use]
    pub fn with_schema(mut self, schema: ExportSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Returns the schema used for exports.
    #[must_use]
    pub fn schema(&self) -> &ExportSchema {
        &self.schema
    }

    /// Lists one page of records.
    pub async fn list(&self, query: AuditListQuery) -> AppResult<AuditPage> {
        let slice = self.store.list(&query).await?;
        let page_size = u64::from(query.page_size);

        Ok(AuditPage {
            items: slice.items,
            total: slice.total,
            page: query.page,
            page_size: query.page_size,
            total_pages: slice.total.div_ceil(page_size),
        })
    }

    /// Returns one record with its actor profile.
    pub async fn find(&self, id: AuditRecordId) -> AppResult<AuditRecordView> {
        self.store
            .find(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("audit record '{id}' does not exist")))
    }

    /// Streams every matching record as CSV, newest first.
    ///
    /// The first chunk carries the byte-order mark and the header row; each
    /// following chunk holds one batch of encoded rows. Filter errors surface
    /// before the stream is created; store errors end the stream.
    pub fn export_csv(
        &self,
        filter: AuditFilter,
    ) -> AppResult<BoxStream<'static, AppResult<String>>> {
        let filter = filter.normalized()?;
        let store = self.store.clone();
        let schema = self.schema.clone();
        let batch_size = self.export_batch_size;

        let chunks = stream::try_unfold(ExportState::Header, move |state| {
            next_export_chunk(
                store.clone(),
                schema.clone(),
                filter.clone(),
                batch_size,
                state,
            )
        });

        Ok(chunks.boxed())
    }
}

async fn next_export_chunk(
    store: Arc<dyn AuditStore>,
    schema: ExportSchema,
    filter: AuditFilter,
    batch_size: usize,
    state: ExportState,
) -> AppResult<Option<(String, ExportState)>> {
    let before = match state {
        ExportState::Header => {
            let chunk = format!("{}{}", csv::UTF8_BOM, csv::encode_header(&schema));
            return Ok(Some((chunk, ExportState::Rows { before: None })));
        }
        ExportState::Rows { before } => before,
        ExportState::Done => return Ok(None),
    };

    let batch = store.export_batch(&filter, before, batch_size).await?;
    let Some(last) = batch.last() else {
        return Ok(None);
    };
    let next_before = last.record.id;
    debug!(rows = batch.len(), before = %next_before, "exported audit batch");

    let chunk: String = batch
        .iter()
        .map(|view| csv::encode_record(&schema, view))
        .collect();
    let next_state = if batch.len() < batch_size {
        ExportState::Done
    } else {
        ExportState::Rows {
            before: Some(next_before),
        }
    };

    Ok(Some((chunk, next_state)))
}
