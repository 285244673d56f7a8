use std::sync::Arc;

use chronicle_domain::ExportSchema;
use tracing::warn;

use crate::AuditStore;

/// Reconciles the export schema with the columns the store actually holds.
///
/// Unmapped stored columns still reach exports through `extra_fields`; the
/// projector only reports them so the schema can be versioned deliberately.
#[derive(Clone)]
pub struct SchemaProjector {
    store: Arc<dyn AuditStore>,
}

impl SchemaProjector {
    /// Creates a projector over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Returns the export schema, warning about drift against the store.
    pub async fn project(&self) -> ExportSchema {
        let schema = ExportSchema::current();

        match self.store.stored_columns().await {
            Ok(stored) => {
                let unmapped = unmapped_columns(&schema, &stored);
                if !unmapped.is_empty() {
                    warn!(
                        schema_version = schema.version(),
                        columns = %unmapped.join(","),
                        "stored audit columns are not mapped by the export schema"
                    );
                }
                let missing = missing_columns(&schema, &stored);
                if !missing.is_empty() {
                    warn!(
                        schema_version = schema.version(),
                        columns = %missing.join(","),
                        "export schema columns are missing from the store"
                    );
                }
            }
            Err(error) => {
                warn!(error = %error, "could not read stored audit columns");
            }
        }

        schema
    }

    /// Returns the header names of the projected schema.
    pub async fn project_columns(&self) -> Vec<&'static str> {
        self.project().await.column_names()
    }
}

fn unmapped_columns(schema: &ExportSchema, stored: &[String]) -> Vec<String> {
    let mapped = schema.stored_column_names();
    stored
        .iter()
        .filter(|column| !mapped.iter().any(|name| *name == column.as_str()))
        .cloned()
        .collect()
}

fn missing_columns(schema: &ExportSchema, stored: &[String]) -> Vec<&'static str> {
    schema
        .stored_column_names()
        .into_iter()
        .filter(|column| !stored.iter().any(|stored| stored == column))
        .collect()
}

#[cfg(test)]
mod tests {
    use chronicle_domain::ExportSchema;

    use super::{missing_columns, unmapped_columns};

    #[test]
    fn new_stored_columns_are_reported_as_unmapped() {
        let schema = ExportSchema::current();
        let mut stored: Vec<String> = schema
            .stored_column_names()
            .into_iter()
            .map(ToOwned::to_owned)
            .collect();
        stored.push("user_agent".to_owned());

        assert_eq!(unmapped_columns(&schema, &stored), vec!["user_agent"]);
        assert!(missing_columns(&schema, &stored).is_empty());
    }

    #[test]
    fn dropped_stored_columns_are_reported_as_missing() {
        let schema = ExportSchema::current();
        let stored: Vec<String> = schema
            .stored_column_names()
            .into_iter()
            .filter(|column| *column != "ip_address")
            .map(ToOwned::to_owned)
            .collect();

        assert_eq!(missing_columns(&schema, &stored), vec!["ip_address"]);
        assert!(unmapped_columns(&schema, &stored).is_empty());
    }

    #[tokio::test]
    async fn projection_falls_back_to_current_schema() {
        let store = std::sync::Arc::new(crate::test_support::FakeAuditStore::default());
        let projector = super::SchemaProjector::new(store);

        assert_eq!(projector.project().await, ExportSchema::current());
        assert_eq!(projector.project_columns().await.len(), 15);
    }
}
