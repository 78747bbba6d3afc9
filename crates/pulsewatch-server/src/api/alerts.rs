use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::middleware::RequestId;

use super::{
    map_db_error, normalize_hours, resources::WindowQuery, ApiError, ApiResponse, AppState,
    ResponseMeta,
};

#[derive(Debug, Serialize)]
pub(super) struct AlertItem {
    pub id: i64,
    pub resource_id: String,
    pub raised_at: DateTime<Utc>,
    pub kind: String,
    pub severity: String,
    pub message: String,
    pub threshold: f64,
    pub observed: f64,
    pub triggering_snapshot_id: i64,
    pub resolved: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct ResolveData {
    pub alert_id: i64,
    pub resolved: bool,
}

pub(super) async fn list_alerts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(resource_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<ApiResponse<Vec<AlertItem>>>, ApiError> {
    let cutoff = Utc::now() - chrono::Duration::hours(normalize_hours(query.hours));
    let rows = state
        .store
        .list_alert_rows(&resource_id, cutoff)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| AlertItem {
            id: row.id,
            resource_id: row.resource_id,
            raised_at: row.raised_at,
            kind: row.kind,
            severity: row.severity,
            message: row.message,
            threshold: row.threshold,
            observed: row.observed,
            triggering_snapshot_id: row.triggering_snapshot_id,
            resolved: row.resolved,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn resolve_alert(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(alert_id): Path<i64>,
) -> Result<Json<ApiResponse<ResolveData>>, ApiError> {
    match state.store.resolve_alert(alert_id).await {
        Ok(()) => Ok(Json(ApiResponse {
            data: ResolveData {
                alert_id,
                resolved: true,
            },
            meta: ResponseMeta::new(req_id.0),
        })),
        Err(pulsewatch_db::DbError::NotFound) => Err(ApiError::new(
            req_id.0,
            "not_found",
            format!("no alert with id {alert_id}"),
        )),
        Err(e) => Err(map_db_error(req_id.0, &e)),
    }
}
