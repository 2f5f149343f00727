//! Flag handlers.

use crate::error::ApiResult;
use crate::models::{
    CreateFlagRequest, FlagResponse, LogsQuery, LogsResponse, SuccessBody, ToggleResponse,
    UpdateFlagRequest,
};
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use trellis::domain::FlagId;
use trellis::engine::{AuditStatus, Transition};
use trellis::pagination::PageRequest;

fn audit_label(status: &AuditStatus) -> String {
    match status {
        AuditStatus::Recorded => "recorded".to_string(),
        AuditStatus::Skipped => "skipped".to_string(),
        AuditStatus::Dispatched => "dispatched".to_string(),
        AuditStatus::Failed(_) => "failed".to_string(),
    }
}

pub(super) async fn create_flag(
    State(state): State<AppState>,
    body: Result<Json<CreateFlagRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SuccessBody<FlagResponse>>)> {
    let Json(request) = body?;
    let created = state.engine.create(request.into()).await?;
    if created.audit.is_failed() {
        tracing::warn!(flag_id = %created.flag.id, "Flag created without an audit entry");
    }

    Ok((
        StatusCode::CREATED,
        Json(SuccessBody::new(
            "Feature Flag is created successfully",
            created.details().into(),
        )),
    ))
}

pub(super) async fn update_flag(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
    body: Result<Json<UpdateFlagRequest>, JsonRejection>,
) -> ApiResult<Json<SuccessBody<ToggleResponse>>> {
    let Path(id) = path?;
    let Json(request) = body?;
    let transition = state
        .engine
        .set_active(FlagId(id), request.active, &request.reason)
        .await?;

    let body = match transition {
        Transition::Applied(report) => SuccessBody::new(
            "Feature Flag is toggled successfully",
            ToggleResponse {
                id: report.flag_id,
                active: report.active,
                audit: audit_label(&report.audit),
                cascaded: report.cascaded,
            },
        ),
        Transition::Unchanged { flag_id, active } => {
            let message = if active {
                "Flag is already active"
            } else {
                "Flag is already inactive"
            };
            SuccessBody::new(
                message,
                ToggleResponse {
                    id: flag_id,
                    active,
                    cascaded: Vec::new(),
                    audit: audit_label(&AuditStatus::Skipped),
                },
            )
        }
    };
    Ok(Json(body))
}

pub(super) async fn get_flag(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
) -> ApiResult<Json<SuccessBody<FlagResponse>>> {
    let Path(id) = path?;
    let details = state.engine.get(FlagId(id)).await?;
    Ok(Json(SuccessBody::new("Feature Flag details", details.into())))
}

pub(super) async fn flag_logs(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> ApiResult<Json<LogsResponse>> {
    let Path(id) = path?;
    // An unknown flag is reported before any problem with the paging.
    let flag = state.engine.flag(FlagId(id)).await?;
    let Query(query) = query?;
    let request = PageRequest::from_optional(query.page, query.size)?;
    let page = state.engine.logs(flag.id, request).await?;
    Ok(Json(page.into()))
}
