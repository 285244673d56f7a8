mod query;
mod store;

pub use query::{
    AuditFilter, AuditListQuery, AuditListSlice, AuditPage, AuditSort, AuditSortField,
    DEFAULT_PAGE_SIZE, ExpiredRecordCursor, MAX_PAGE_SIZE, SortDirection,
};
pub use store::AuditStore;
