use std::sync::Arc;

use chronicle_core::AppResult;
use chronicle_domain::ArchiveFileName;
use tracing::{info, warn};

use crate::ArchiveStorage;

/// Bounds the number of archives kept in the backup directory.
#[derive(Clone)]
pub struct ArchiveRotation {
    storage: Arc<dyn ArchiveStorage>,
}

impl ArchiveRotation {
    /// Creates a rotation over the given storage.
    #[must_use]
    pub fn new(storage: Arc<dyn ArchiveStorage>) -> Self {
        Self { storage }
    }

    /// Keeps the `keep_count` newest archives and deletes the rest.
    ///
    /// Returns the archives actually deleted. A file that cannot be deleted is
    /// logged and left for the next rotation.
    pub async fn enforce_retention(&self, keep_count: usize) -> AppResult<Vec<ArchiveFileName>> {
        let mut archives = self.storage.list_archives().await?;
        archives.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| right.name.as_str().cmp(left.name.as_str()))
        });

        let mut deleted = Vec::new();
        for archive in archives.into_iter().skip(keep_count) {
            match self.storage.delete_archive(&archive.name).await {
                Ok(()) => {
                    info!(archive = archive.name.as_str(), "rotated audit archive");
                    deleted.push(archive.name);
                }
                Err(error) => {
                    warn!(
                        archive = archive.name.as_str(),
                        error = %error,
                        "failed to rotate audit archive"
                    );
                }
            }
        }

        Ok(deleted)
    }
}
