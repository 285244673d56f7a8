use async_trait::async_trait;
use chronicle_core::AppResult;
use chronicle_domain::{ArchiveFile, ArchiveFileName, AuditRecordView, ExportSchema};

/// Port for the backup directory holding archive artifacts.
#[async_trait]
pub trait ArchiveStorage: Send + Sync {
    /// Starts a new archive; nothing is visible under `name` until the draft finishes.
    async fn begin_archive(
        &self,
        name: ArchiveFileName,
        schema: &ExportSchema,
    ) -> AppResult<Box<dyn ArchiveDraft>>;

    /// Returns the archive metadata, or `None` when the file does not exist.
    async fn inspect_archive(&self, name: &ArchiveFileName) -> AppResult<Option<ArchiveFile>>;

    /// Lists archives in the backup directory in no particular order.
    async fn list_archives(&self) -> AppResult<Vec<ArchiveFile>>;

    /// Removes one archive.
    async fn delete_archive(&self, name: &ArchiveFileName) -> AppResult<()>;
}

/// An archive being written; either finished or discarded, never both.
#[async_trait]
pub trait ArchiveDraft: Send {
    /// Appends one batch of rows.
    async fn append(&mut self, rows: &[AuditRecordView]) -> AppResult<()>;

    /// Number of data rows appended so far.
    fn rows_written(&self) -> u64;

    /// Compresses the draft into its final archive and removes temporary files.
    ///
    /// On error no archive and no temporary file remain.
    async fn finish(self: Box<Self>) -> AppResult<ArchiveFile>;

    /// Drops the draft and removes its temporary files.
    async fn discard(self: Box<Self>) -> AppResult<()>;
}
