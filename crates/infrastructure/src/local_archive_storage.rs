//! Backup-directory archive storage: CSV staged on disk, then deflated into a
//! single-entry zip and linked into place under a name no other archive holds.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use chronicle_application::{ArchiveDraft, ArchiveStorage};
use chronicle_core::{AppError, AppResult};
use chronicle_domain::{ArchiveFile, ArchiveFileName, AuditRecordView, ExportSchema, csv};

/// Archive storage rooted at one local backup directory.
#[derive(Debug, Clone)]
pub struct LocalArchiveStorage {
    directory: PathBuf,
}

impl LocalArchiveStorage {
    /// Creates a storage rooted at `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Returns the backup directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        self.directory.as_path()
    }

    /// Creates the backup directory when missing.
    pub async fn ensure_directory(&self) -> AppResult<()> {
        fs::create_dir_all(&self.directory).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to create backup directory '{}': {error}",
                self.directory.display()
            ))
        })
    }

    fn archive_path(&self, name: &ArchiveFileName) -> PathBuf {
        self.directory.join(name.as_str())
    }
}

struct LocalArchiveDraft {
    name: ArchiveFileName,
    schema: ExportSchema,
    final_path: PathBuf,
    csv_path: PathBuf,
    zip_path: PathBuf,
    writer: BufWriter<File>,
    rows_written: u64,
}

#[async_trait]
impl ArchiveStorage for LocalArchiveStorage {
    async fn begin_archive(
        &self,
        name: ArchiveFileName,
        schema: &ExportSchema,
    ) -> AppResult<Box<dyn ArchiveDraft>> {
        self.ensure_directory().await?;

        let final_path = self.archive_path(&name);
        let csv_path = self.directory.join(format!(".{}.partial", name.csv_entry_name()));
        let zip_path = self.directory.join(format!(".{}.partial", name.as_str()));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&csv_path)
            .await
            .map_err(|error| io_error("failed to create temporary archive csv", &csv_path, error))?;

        let mut draft = LocalArchiveDraft {
            name,
            schema: schema.clone(),
            final_path,
            csv_path,
            zip_path,
            writer: BufWriter::new(file),
            rows_written: 0,
        };

        let header = format!("{}{}", csv::UTF8_BOM, csv::encode_header(&draft.schema));
        if let Err(error) = draft.writer.write_all(header.as_bytes()).await {
            let path = draft.csv_path.clone();
            remove_if_exists(&path).await;
            return Err(io_error("failed to write archive header", &path, error));
        }

        debug!(archive = draft.name.as_str(), "started audit archive draft");
        Ok(Box::new(draft))
    }

    async fn inspect_archive(&self, name: &ArchiveFileName) -> AppResult<Option<ArchiveFile>> {
        let path = self.archive_path(name);
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(Some(ArchiveFile {
                name: name.clone(),
                created_at: created_at(&metadata),
                size_bytes: metadata.len(),
                record_count: None,
            })),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(io_error("failed to inspect archive", &path, error)),
        }
    }

    async fn list_archives(&self) -> AppResult<Vec<ArchiveFile>> {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(io_error(
                    "failed to read backup directory",
                    &self.directory,
                    error,
                ));
            }
        };

        let mut archives = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| io_error("failed to read backup directory", &self.directory, error))?
        {
            let Some(file_name) = entry.file_name().to_str().map(ToOwned::to_owned) else {
                continue;
            };
            let Ok(name) = ArchiveFileName::parse(file_name.as_str()) else {
                continue;
            };
            let metadata = entry
                .metadata()
                .await
                .map_err(|error| io_error("failed to inspect archive", &entry.path(), error))?;
            if !metadata.is_file() {
                continue;
            }

            archives.push(ArchiveFile {
                name,
                created_at: created_at(&metadata),
                size_bytes: metadata.len(),
                record_count: None,
            });
        }

        Ok(archives)
    }

    async fn delete_archive(&self, name: &ArchiveFileName) -> AppResult<()> {
        let path = self.archive_path(name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(io_error("failed to delete archive", &path, error)),
        }
    }
}

#[async_trait]
impl ArchiveDraft for LocalArchiveDraft {
    async fn append(&mut self, rows: &[AuditRecordView]) -> AppResult<()> {
        let chunk: String = rows
            .iter()
            .map(|view| csv::encode_record(&self.schema, view))
            .collect();

        self.writer
            .write_all(chunk.as_bytes())
            .await
            .map_err(|error| io_error("failed to write archive rows", &self.csv_path, error))?;
        self.rows_written += rows.len() as u64;
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.rows_written
    }

    async fn finish(self: Box<Self>) -> AppResult<ArchiveFile> {
        let csv_path = self.csv_path.clone();
        let zip_path = self.zip_path.clone();

        let result = (*self).seal().await;
        remove_if_exists(&csv_path).await;
        if result.is_err() {
            remove_if_exists(&zip_path).await;
        }

        result
    }

    async fn discard(self: Box<Self>) -> AppResult<()> {
        let Self {
            csv_path,
            zip_path,
            writer,
            ..
        } = *self;
        drop(writer);

        remove_if_exists(&csv_path).await;
        remove_if_exists(&zip_path).await;
        Ok(())
    }
}

impl LocalArchiveDraft {
    async fn seal(self) -> AppResult<ArchiveFile> {
        let Self {
            name,
            schema,
            final_path,
            csv_path,
            zip_path,
            mut writer,
            rows_written,
        } = self;

        writer
            .flush()
            .await
            .map_err(|error| io_error("failed to flush archive csv", &csv_path, error))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|error| io_error("failed to sync archive csv", &csv_path, error))?;

        let entry_name = name.csv_entry_name();
        let comment = format!(
            "chronicle-audit-export schema=v{} rows={rows_written}",
            schema.version()
        );
        let source = csv_path.clone();
        let target = zip_path.clone();
        tokio::task::spawn_blocking(move || compress_csv(&source, &target, entry_name, comment))
            .await
            .map_err(|error| {
                AppError::Internal(format!("archive compression task failed: {error}"))
            })??;

        place_archive(&zip_path, &final_path).await?;

        let metadata = match fs::metadata(&final_path).await {
            Ok(metadata) if metadata.len() > 0 => metadata,
            Ok(_) => {
                remove_if_exists(&final_path).await;
                return Err(AppError::Internal(format!(
                    "archive '{}' is empty",
                    final_path.display()
                )));
            }
            Err(error) => {
                remove_if_exists(&final_path).await;
                return Err(io_error("failed to inspect archive", &final_path, error));
            }
        };

        Ok(ArchiveFile {
            name,
            created_at: created_at(&metadata),
            size_bytes: metadata.len(),
            record_count: Some(rows_written),
        })
    }
}

/// Links the finished temp zip under its final name without replacing an
/// archive that already holds that name.
async fn place_archive(zip_path: &Path, final_path: &Path) -> AppResult<()> {
    match fs::hard_link(zip_path, final_path).await {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
            return Err(AppError::Conflict(format!(
                "archive '{}' already exists",
                final_path.display()
            )));
        }
        Err(error) => {
            return Err(io_error("failed to move archive into place", final_path, error));
        }
    }

    if let Err(error) = fs::remove_file(zip_path).await {
        remove_if_exists(final_path).await;
        return Err(io_error("failed to remove temporary archive", zip_path, error));
    }
    Ok(())
}

fn compress_csv(
    csv_path: &Path,
    zip_path: &Path,
    entry_name: String,
    comment: String,
) -> AppResult<()> {
    let zip_error = |error: zip::result::ZipError| {
        AppError::Internal(format!(
            "failed to compress archive '{}': {error}",
            zip_path.display()
        ))
    };

    let mut source = std::fs::File::open(csv_path)
        .map_err(|error| io_error("failed to reopen archive csv", csv_path, error))?;
    let target = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(zip_path)
        .map_err(|error| io_error("failed to create temporary archive", zip_path, error))?;

    let mut zip = ZipWriter::new(target);
    zip.set_comment(comment);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));
    zip.start_file(entry_name, options).map_err(zip_error)?;
    io::copy(&mut source, &mut zip)
        .map_err(|error| io_error("failed to compress archive", zip_path, error))?;

    let target = zip.finish().map_err(zip_error)?;
    target
        .sync_all()
        .map_err(|error| io_error("failed to sync archive", zip_path, error))
}

fn created_at(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

async fn remove_if_exists(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => {
            warn!(path = %path.display(), error = %error, "failed to remove archive file");
        }
    }
}

fn io_error(context: &str, path: &Path, error: io::Error) -> AppError {
    AppError::Internal(format!("{context} '{}': {error}", path.display()))
}

#[cfg(test)]
mod tests;
