use std::sync::Arc;

use chronicle_core::{AppError, AppResult};
use chronicle_domain::{ArchiveFile, ArchiveFileName, AuditRecordView, ExportSchema};
use tracing::warn;

use crate::{ArchiveDraft, ArchiveStorage};

/// Produces compressed CSV archives in the backup directory.
#[derive(Clone)]
pub struct ArchiveBuilder {
    storage: Arc<dyn ArchiveStorage>,
}

impl ArchiveBuilder {
    /// Creates a builder over the given storage.
    #[must_use]
    pub fn new(storage: Arc<dyn ArchiveStorage>) -> Self {
        Self { storage }
    }

    /// Starts a streamed archive; rows are appended batch by batch.
    pub async fn begin(
        &self,
        name: ArchiveFileName,
        schema: &ExportSchema,
    ) -> AppResult<Box<dyn ArchiveDraft>> {
        self.storage.begin_archive(name, schema).await
    }

    /// Builds one archive from rows already in memory.
    pub async fn build(
        &self,
        name: ArchiveFileName,
        schema: &ExportSchema,
        rows: &[AuditRecordView],
    ) -> AppResult<ArchiveFile> {
        let mut draft = self.begin(name, schema).await?;
        if let Err(error) = draft.append(rows).await {
            discard_quietly(draft).await;
            return Err(error);
        }

        let expected_rows = draft.rows_written();
        let file = draft.finish().await?;
        self.verify(&file, expected_rows).await?;
        Ok(file)
    }

    /// Confirms the finished archive exists, is non-empty and holds `expected_rows`.
    pub async fn verify(&self, file: &ArchiveFile, expected_rows: u64) -> AppResult<()> {
        let Some(stored) = self.storage.inspect_archive(&file.name).await? else {
            return Err(AppError::Internal(format!(
                "archive '{}' was not found after writing",
                file.name.as_str()
            )));
        };

        if stored.size_bytes == 0 {
            return Err(AppError::Internal(format!(
                "archive '{}' is empty",
                file.name.as_str()
            )));
        }

        if let Some(record_count) = file.record_count {
            if record_count != expected_rows {
                return Err(AppError::Internal(format!(
                    "archive '{}' holds {record_count} rows, expected {expected_rows}",
                    file.name.as_str()
                )));
            }
        }

        Ok(())
    }
}

/// Discards a draft after a failed write, logging cleanup problems.
pub(crate) async fn discard_quietly(draft: Box<dyn ArchiveDraft>) {
    if let Err(error) = draft.discard().await {
        warn!(error = %error, "failed to remove temporary archive files");
    }
}
