use std::net::SocketAddr;
use std::str::FromStr;

use axum::Json;
use axum::extract::{ConnectInfo, State};
use axum::http::{Extensions, HeaderMap, StatusCode};
use chronicle_application::RecordAuditInput;
use chronicle_core::ActorId;
use chronicle_domain::{AuditModule, AuditStatus, OperationType, RequestContext};

use crate::dto::{RecordAuditRequest, RecordAuditResponse};
use crate::error::ApiResult;
use crate::request_context::client_ip;
use crate::state::AppState;

/// Records one event on behalf of an out-of-process module.
///
/// Storage failures do not fail the call; the response reports whether the
/// row was kept.
pub async fn record_audit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(payload): Json<RecordAuditRequest>,
) -> ApiResult<(StatusCode, Json<RecordAuditResponse>)> {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| *address);

    let mut input = RecordAuditInput::new(
        ActorId::new(payload.actor_id)?,
        OperationType::from_str(payload.operation_type.as_str())?,
        AuditModule::from_str(payload.module.as_str())?,
        payload.description,
    );
    input.target_type = payload.target_type;
    input.target_id = payload.target_id;
    if let Some(status) = payload.status.as_deref() {
        input = input.with_status(AuditStatus::from_str(status)?);
    }

    let snapshot = payload.request.unwrap_or_default();
    let context = RequestContext {
        ip_address: payload
            .client_ip
            .or_else(|| client_ip(&headers, peer, &state.trusted_proxies)),
        query: snapshot.query,
        body: snapshot.body,
        params: snapshot.params,
    };

    let stored = state.audit_writer.record(input, &context).await;
    Ok((StatusCode::ACCEPTED, Json(RecordAuditResponse::from(stored))))
}
