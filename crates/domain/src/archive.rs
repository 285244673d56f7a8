use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chronicle_core::{AppError, AppResult};

const ARCHIVE_PREFIX: &str = "audit_logs_before_";
const ARCHIVE_EXTENSION: &str = ".zip";
const CSV_EXTENSION: &str = ".csv";
const GENERATED_AT_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Archive file name encoding the retention cutoff date and generation time.
///
/// Shape: `audit_logs_before_<YYYY-MM-DD>_<YYYYMMDDTHHMMSSZ>.zip`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchiveFileName {
    file_name: String,
    cutoff_date: NaiveDate,
    generated_at: DateTime<Utc>,
}

impl ArchiveFileName {
    /// Builds the name for an archive of records older than `cutoff`.
    #[must_use]
    pub fn new(cutoff: DateTime<Utc>, generated_at: DateTime<Utc>) -> Self {
        let cutoff_date = cutoff.date_naive();
        let file_name = format!(
            "{ARCHIVE_PREFIX}{}_{}{ARCHIVE_EXTENSION}",
            cutoff_date.format("%Y-%m-%d"),
            generated_at.format(GENERATED_AT_FORMAT)
        );

        Self {
            file_name,
            cutoff_date,
            generated_at: trim_to_seconds(generated_at),
        }
    }

    /// Parses an existing archive file name.
    pub fn parse(file_name: &str) -> AppResult<Self> {
        let invalid =
            || AppError::Validation(format!("'{file_name}' is not an audit archive file name"));

        let stem = file_name
            .strip_prefix(ARCHIVE_PREFIX)
            .and_then(|rest| rest.strip_suffix(ARCHIVE_EXTENSION))
            .ok_or_else(invalid)?;
        let (cutoff_part, generated_part) = stem.split_once('_').ok_or_else(invalid)?;

        let cutoff_date =
            NaiveDate::parse_from_str(cutoff_part, "%Y-%m-%d").map_err(|_| invalid())?;
        let generated_at = NaiveDateTime::parse_from_str(generated_part, GENERATED_AT_FORMAT)
            .map_err(|_| invalid())?
            .and_utc();

        Ok(Self {
            file_name: file_name.to_owned(),
            cutoff_date,
            generated_at,
        })
    }

    /// Returns the full file name including extension.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.file_name.as_str()
    }

    /// Returns the name of the single CSV entry inside the archive.
    #[must_use]
    pub fn csv_entry_name(&self) -> String {
        let stem = self
            .file_name
            .strip_suffix(ARCHIVE_EXTENSION)
            .unwrap_or(self.file_name.as_str());
        format!("{stem}{CSV_EXTENSION}")
    }

    /// Returns the cutoff date encoded in the name.
    #[must_use]
    pub fn cutoff_date(&self) -> NaiveDate {
        self.cutoff_date
    }

    /// Returns the generation timestamp encoded in the name.
    #[must_use]
    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }
}

/// One archive artifact produced by a retention run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    /// Archive file name.
    pub name: ArchiveFileName,
    /// File-system creation time, used for rotation ordering.
    pub created_at: DateTime<Utc>,
    /// On-disk size in bytes.
    pub size_bytes: u64,
    /// Data rows captured, when known to the caller.
    pub record_count: Option<u64>,
}

fn trim_to_seconds(value: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(value.timestamp(), 0).unwrap_or(value)
}
