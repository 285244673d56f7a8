//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_audit_store;
mod local_archive_storage;
mod local_retention_lease_coordinator;
mod postgres_audit_store;
mod redis_retention_lease_coordinator;

pub use in_memory_audit_store::InMemoryAuditStore;
pub use local_archive_storage::LocalArchiveStorage;
pub use local_retention_lease_coordinator::LocalRetentionLeaseCoordinator;
pub use postgres_audit_store::PostgresAuditStore;
pub use redis_retention_lease_coordinator::RedisRetentionLeaseCoordinator;
