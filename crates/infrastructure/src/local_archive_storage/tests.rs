use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use chronicle_application::{
    ArchiveBuilder, ArchiveRotation, ArchiveStorage, AuditStore, RetentionJob, RetentionPolicy,
    RetentionRunOutcome,
};
use chronicle_core::{ActorId, AppError};
use chronicle_domain::{
    ActorProfile, ArchiveFileName, AuditModule, AuditRecord, AuditRecordId, AuditRecordView,
    AuditStatus, ExportSchema, NewAuditRecord, OperationType,
};

use crate::{InMemoryAuditStore, LocalRetentionLeaseCoordinator};

use super::LocalArchiveStorage;

fn temp_dir() -> tempfile::TempDir {
    match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(error) => panic!("failed to create temp dir: {error}"),
    }
}

fn actor() -> ActorId {
    ActorId::new(7).unwrap_or_else(|error| panic!("{error}"))
}

fn new_record(description: &str, age_days: i64) -> NewAuditRecord {
    NewAuditRecord {
        actor_id: actor(),
        operation_type: OperationType::Delete,
        module: AuditModule::CaseStudy,
        description: description.to_owned(),
        target_type: Some("case_study".to_owned()),
        target_id: Some("9".to_owned()),
        ip_address: Some("198.51.100.20".to_owned()),
        request_params: None,
        status: AuditStatus::Success,
        created_at: Utc::now() - Duration::days(age_days),
    }
}

fn view(id: i64, description: &str) -> AuditRecordView {
    AuditRecordView::new(
        AuditRecord::from_new(AuditRecordId::from_i64(id), new_record(description, 100)),
        Some(ActorProfile {
            username: "editor".to_owned(),
            email: None,
            phone: None,
        }),
    )
}

fn file_names(directory: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(directory) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str().map(ToOwned::to_owned))
        .collect();
    names.sort();
    names
}

struct ArchiveContents {
    entry_names: Vec<String>,
    comment: String,
    csv: String,
}

fn read_archive(path: &Path) -> ArchiveContents {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(error) => panic!("archive should exist: {error}"),
    };
    let mut archive = match zip::ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(error) => panic!("archive should be a valid zip: {error}"),
    };
    let comment = String::from_utf8_lossy(archive.comment()).into_owned();
    let entry_names = archive.file_names().map(ToOwned::to_owned).collect();

    let mut csv = String::new();
    match archive.by_index(0) {
        Ok(mut entry) => {
            if let Err(error) = entry.read_to_string(&mut csv) {
                panic!("archive entry should be utf-8: {error}");
            }
        }
        Err(error) => panic!("archive should hold one entry: {error}"),
    }

    ArchiveContents {
        entry_names,
        comment,
        csv,
    }
}

#[tokio::test]
async fn finished_archive_holds_one_deflated_csv_entry() {
    let dir = temp_dir();
    let storage = LocalArchiveStorage::new(dir.path());
    let name = ArchiveFileName::new(Utc::now() - Duration::days(90), Utc::now());

    let Ok(mut draft) = storage.begin_archive(name.clone(), &ExportSchema::current()).await else {
        panic!("draft should start");
    };
    assert!(draft.append(&[view(1, "first")]).await.is_ok());
    assert!(draft.append(&[view(2, "second, \"quoted\"\nline")]).await.is_ok());
    let Ok(file) = draft.finish().await else {
        panic!("archive should finish");
    };

    assert_eq!(file.record_count, Some(2));
    assert!(file.size_bytes > 0);
    assert_eq!(file_names(dir.path()), vec![name.as_str().to_owned()]);

    let contents = read_archive(&dir.path().join(name.as_str()));
    assert_eq!(contents.entry_names, vec![name.csv_entry_name()]);
    assert_eq!(contents.comment, "chronicle-audit-export schema=v1 rows=2");
    assert!(contents.csv.starts_with("\u{feff}\"id\",\"actor_id\""));
    assert!(contents.csv.contains("\"second, \"\"quoted\"\"\nline\""));
    assert!(contents.csv.contains("\"editor\""));
}

#[tokio::test]
async fn discarded_draft_leaves_no_files() {
    let dir = temp_dir();
    let storage = LocalArchiveStorage::new(dir.path());
    let name = ArchiveFileName::new(Utc::now(), Utc::now());

    let Ok(mut draft) = storage.begin_archive(name, &ExportSchema::current()).await else {
        panic!("draft should start");
    };
    assert!(draft.append(&[view(1, "first")]).await.is_ok());
    assert!(draft.discard().await.is_ok());

    assert!(file_names(dir.path()).is_empty());
}

#[tokio::test]
async fn finishing_never_replaces_an_existing_archive() {
    let dir = temp_dir();
    let storage = LocalArchiveStorage::new(dir.path());
    let name = ArchiveFileName::new(Utc::now() - Duration::days(90), Utc::now());
    let existing = dir.path().join(name.as_str());
    if let Err(error) = std::fs::write(&existing, b"earlier archive") {
        panic!("failed to seed archive: {error}");
    }

    let Ok(mut draft) = storage.begin_archive(name.clone(), &ExportSchema::current()).await else {
        panic!("draft should start");
    };
    assert!(draft.append(&[view(1, "first")]).await.is_ok());
    let result = draft.finish().await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(std::fs::read(&existing).unwrap_or_default(), b"earlier archive");
    assert_eq!(file_names(dir.path()), vec![name.as_str().to_owned()]);
}

#[tokio::test]
async fn failed_finish_leaves_no_partial_or_final_file() {
    let dir = temp_dir();
    let storage = LocalArchiveStorage::new(dir.path());
    let name = ArchiveFileName::new(Utc::now() - Duration::days(90), Utc::now());

    let Ok(mut draft) = storage.begin_archive(name.clone(), &ExportSchema::current()).await else {
        panic!("draft should start");
    };
    assert!(draft.append(&[view(1, "first")]).await.is_ok());
    // A stale temp zip makes compression fail to create its output.
    let stale = dir.path().join(format!(".{}.partial", name.as_str()));
    if let Err(error) = std::fs::write(&stale, b"stale") {
        panic!("failed to seed temp zip: {error}");
    }

    assert!(draft.finish().await.is_err());
    assert!(file_names(dir.path()).is_empty());
}

#[tokio::test]
async fn listing_ignores_foreign_and_partial_files() {
    let dir = temp_dir();
    let storage = LocalArchiveStorage::new(dir.path());
    let name = ArchiveFileName::new(Utc::now(), Utc::now());

    for foreign in ["notes.txt", ".audit_logs_before_2026-01-01_20260101T000000Z.zip.partial"] {
        assert!(std::fs::write(dir.path().join(foreign), b"x").is_ok());
    }
    assert!(std::fs::write(dir.path().join(name.as_str()), b"PK").is_ok());

    let archives = storage.list_archives().await.unwrap_or_default();

    assert_eq!(archives.len(), 1);
    assert_eq!(archives[0].name, name);
    assert_eq!(archives[0].size_bytes, 2);
}

#[tokio::test]
async fn missing_archives_are_tolerated() {
    let dir = temp_dir();
    let storage = LocalArchiveStorage::new(dir.path().join("not-created-yet"));
    let name = ArchiveFileName::new(Utc::now(), Utc::now());

    assert!(matches!(storage.inspect_archive(&name).await, Ok(None)));
    assert!(storage.delete_archive(&name).await.is_ok());
    assert!(matches!(storage.list_archives().await, Ok(archives) if archives.is_empty()));
}

fn retention_job(
    store: Arc<InMemoryAuditStore>,
    storage: Arc<LocalArchiveStorage>,
    keep_count: usize,
) -> RetentionJob {
    let policy = match RetentionPolicy::new(90, keep_count, 2, 60, "test-worker") {
        Ok(policy) => policy,
        Err(error) => panic!("policy should be valid: {error}"),
    };

    RetentionJob::new(
        store,
        ArchiveBuilder::new(storage.clone()),
        ArchiveRotation::new(storage),
        Arc::new(LocalRetentionLeaseCoordinator::new()),
        policy,
    )
}

#[tokio::test]
async fn retention_run_archives_expired_rows_to_disk_before_purging() {
    let dir = temp_dir();
    let store = Arc::new(InMemoryAuditStore::new());
    let storage = Arc::new(LocalArchiveStorage::new(dir.path().join("audit-logs")));
    for (description, age) in [
        ("removed case study \"Acme, Inc.\"", 100),
        ("updated case study", 95),
        ("published case study", 10),
    ] {
        assert!(store.append(new_record(description, age)).await.is_ok());
    }

    let outcome = retention_job(store.clone(), storage.clone(), 12)
        .run(Utc::now())
        .await;

    let Ok(RetentionRunOutcome::Completed(report)) = outcome else {
        panic!("retention run should complete");
    };
    assert_eq!(report.exported, 2);
    assert_eq!(report.deleted, 2);
    assert_eq!(store.len().await, 1);

    let contents = read_archive(&storage.directory().join(report.archive.name.as_str()));
    let lines: Vec<&str> = contents.csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains("\"removed case study \"\"Acme, Inc.\"\"\""));
    assert!(lines[2].contains("\"updated case study\""));
    assert_eq!(file_names(storage.directory()).len(), 1);
}

#[tokio::test]
async fn repeated_runs_keep_only_the_newest_archives() {
    let dir = temp_dir();
    let store = Arc::new(InMemoryAuditStore::new());
    let storage = Arc::new(LocalArchiveStorage::new(dir.path()));
    let job = retention_job(store.clone(), storage.clone(), 2);

    for quarter in 0..4 {
        let now = Utc::now() + Duration::days(91 * quarter);
        assert!(
            store
                .append(new_record("expired", 100 - 91 * quarter))
                .await
                .is_ok()
        );
        let outcome = job.run(now).await;
        assert!(matches!(outcome, Ok(RetentionRunOutcome::Completed(_))));
    }

    let nothing = job.run(Utc::now() + Duration::days(400)).await;
    assert!(matches!(
        nothing,
        Ok(RetentionRunOutcome::NothingToArchive { .. })
    ));
    assert_eq!(file_names(storage.directory()).len(), 2);
    assert!(store.is_empty().await);
}
