use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use chronicle_core::AppError;

use crate::error::ApiResult;
use crate::state::AppState;

/// Rejects ingest calls that do not carry the shared bearer secret.
pub async fn require_ingest_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| AppError::Unauthorized("ingest credentials required".to_owned()))?;

    if !secrets_match(presented.as_bytes(), state.ingest_secret.as_bytes()) {
        return Err(AppError::Unauthorized("invalid ingest credentials".to_owned()).into());
    }

    Ok(next.run(request).await)
}

// Compares every byte so timing does not reveal the matching prefix length.
fn secrets_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }

    presented
        .iter()
        .zip(expected)
        .fold(0_u8, |difference, (left, right)| difference | (left ^ right))
        == 0
}

#[cfg(test)]
mod tests {
    use super::secrets_match;

    #[test]
    fn secrets_must_match_exactly() {
        assert!(secrets_match(b"0123456789abcdef", b"0123456789abcdef"));
        assert!(!secrets_match(b"0123456789abcdeF", b"0123456789abcdef"));
        assert!(!secrets_match(b"0123456789abcde", b"0123456789abcdef"));
        assert!(!secrets_match(b"", b"0123456789abcdef"));
    }
}
