use serde_json::{Map, Value};

/// Replacement written in place of sensitive request values.
pub const REDACTED_MARKER: &str = "[REDACTED]";

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "token",
    "accesstoken",
    "refreshtoken",
    "secret",
    "clientsecret",
    "apikey",
    "authorization",
    "cookie",
];

const SENSITIVE_SUFFIXES: &[&str] = &["password", "token", "secret"];

/// Request-scoped data captured at the business-operation boundary and
/// threaded explicitly into the audit writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    /// Best-effort client address.
    pub ip_address: Option<String>,
    /// Query string parameters.
    pub query: Option<Value>,
    /// Request body.
    pub body: Option<Value>,
    /// Path parameters.
    pub params: Option<Value>,
}

impl RequestContext {
    /// Creates an empty context for callers without an originating request.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Returns the redacted request snapshot grouped by `query`, `body` and
    /// `params`, or `None` when nothing was captured.
    #[must_use]
    pub fn sanitized_params(&self) -> Option<Value> {
        let mut grouped = Map::new();
        for (group, value) in [
            ("query", &self.query),
            ("body", &self.body),
            ("params", &self.params),
        ] {
            if let Some(value) = value.as_ref().filter(|value| !is_empty_value(value)) {
                grouped.insert(group.to_owned(), redact_value(value));
            }
        }

        (!grouped.is_empty()).then_some(Value::Object(grouped))
    }
}

/// Returns whether a request key names a credential-like value.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|character| *character != '_' && *character != '-')
        .flat_map(char::to_lowercase)
        .collect();

    SENSITIVE_KEYS.contains(&normalized.as_str())
        || SENSITIVE_SUFFIXES
            .iter()
            .any(|suffix| normalized.ends_with(suffix))
}

/// Returns a copy of `value` with every sensitive key's value replaced by
/// [`REDACTED_MARKER`], descending through nested objects and arrays.
#[must_use]
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, nested)| {
                    let redacted = if is_sensitive_key(key) {
                        Value::String(REDACTED_MARKER.to_owned())
                    } else {
                        redact_value(nested)
                    };
                    (key.clone(), redacted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(entries) => entries.is_empty(),
        _ => false,
    }
}
