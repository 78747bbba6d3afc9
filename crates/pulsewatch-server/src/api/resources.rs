use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use pulsewatch_core::{MetadataStore, TierCounts};
use pulsewatch_monitor::ResourceStatus;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, normalize_hours, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct WatchRequest {
    pub resource_id: String,
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub(super) struct UnwatchData {
    pub resource_id: String,
    pub removed: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct HistoryItem {
    pub id: i64,
    pub taken_at: DateTime<Utc>,
    pub sample_size: i64,
    pub mean_polarity: f64,
    pub tier_counts: TierCounts,
}

#[derive(Debug, Deserialize)]
pub(super) struct WindowQuery {
    pub hours: Option<i64>,
}

pub(super) async fn list_resources(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<Vec<ResourceStatus>>> {
    Json(ApiResponse {
        data: state.monitor.statuses(),
        meta: ResponseMeta::new(req_id.0),
    })
}

pub(super) async fn watch_resource(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<WatchRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ResourceStatus>>), ApiError> {
    let resource_id = body.resource_id.trim();
    if resource_id.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "resource_id must not be empty",
        ));
    }
    if body.poll_interval_secs == Some(0) {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "poll_interval_secs must be positive",
        ));
    }

    let interval = body.poll_interval_secs.map(Duration::from_secs);
    if !state.monitor.watch(resource_id, interval) {
        return Err(ApiError::new(
            req_id.0,
            "conflict",
            format!("resource {resource_id} is already watched"),
        ));
    }

    let status = state.monitor.status(resource_id).ok_or_else(|| {
        ApiError::new(
            req_id.0.clone(),
            "internal_error",
            "resource vanished during registration",
        )
    })?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: status,
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub(super) struct IntervalRequest {
    pub poll_interval_secs: u64,
}

pub(super) async fn set_interval(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(resource_id): Path<String>,
    Json(body): Json<IntervalRequest>,
) -> Result<Json<ApiResponse<ResourceStatus>>, ApiError> {
    if body.poll_interval_secs == 0 {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "poll_interval_secs must be positive",
        ));
    }
    if !state
        .monitor
        .set_interval(&resource_id, Duration::from_secs(body.poll_interval_secs))
    {
        return Err(ApiError::new(
            req_id.0,
            "not_found",
            format!("resource {resource_id} is not watched"),
        ));
    }

    let status = state.monitor.status(&resource_id).ok_or_else(|| {
        ApiError::new(
            req_id.0.clone(),
            "internal_error",
            "resource vanished during reconfiguration",
        )
    })?;
    Ok(Json(ApiResponse {
        data: status,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn unwatch_resource(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(resource_id): Path<String>,
) -> Result<Json<ApiResponse<UnwatchData>>, ApiError> {
    if !state.monitor.unwatch(&resource_id) {
        return Err(ApiError::new(
            req_id.0,
            "not_found",
            format!("resource {resource_id} is not watched"),
        ));
    }
    Ok(Json(ApiResponse {
        data: UnwatchData {
            resource_id,
            removed: true,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_history(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(resource_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<ApiResponse<Vec<HistoryItem>>>, ApiError> {
    let to = Utc::now();
    let from = to - chrono::Duration::hours(normalize_hours(query.hours));
    let rows = state
        .store
        .list_snapshot_rows(&resource_id, from, to)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| HistoryItem {
            id: row.id,
            taken_at: row.taken_at,
            sample_size: row.sample_size,
            mean_polarity: row.mean_polarity,
            tier_counts: TierCounts {
                very_negative: row.very_negative_count,
                negative: row.negative_count,
                neutral: row.neutral_count,
                positive: row.positive_count,
                very_positive: row.very_positive_count,
            },
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[derive(Debug, Serialize)]
pub(super) struct MetadataData {
    pub resource_id: String,
    pub title: String,
    pub owner_name: String,
    pub fetched_at: DateTime<Utc>,
}

pub(super) async fn get_metadata(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(resource_id): Path<String>,
) -> Result<Json<ApiResponse<MetadataData>>, ApiError> {
    let entry = state
        .store
        .load_metadata(&resource_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "metadata lookup failed");
            ApiError::new(req_id.0.clone(), "internal_error", "metadata lookup failed")
        })?
        .ok_or_else(|| {
            ApiError::new(
                req_id.0.clone(),
                "not_found",
                format!("no cached metadata for resource {resource_id}"),
            )
        })?;

    Ok(Json(ApiResponse {
        data: MetadataData {
            resource_id: entry.resource_id,
            title: entry.title,
            owner_name: entry.owner_name,
            fetched_at: entry.fetched_at,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
