//! HTTP request handlers.

use super::AppState;
use crate::db::{DbError, Heartbeat, Monitor};
use crate::downtime::{DowntimeError, DowntimeWindow};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;

// ============================================================================
// API: Monitors
// ============================================================================

pub async fn handle_get_monitors(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.get_monitors() {
        Ok(monitors) => Json(monitors).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMonitorRequest {
    pub name: String,
    #[serde(default)]
    pub url: String,
}

pub async fn handle_create_monitor(
    State(state): State<AppState>,
    Json(req): Json<CreateMonitorRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Monitor name is required").into_response();
    }

    let mut monitor = Monitor {
        id: 0,
        name: req.name,
        url: req.url,
    };

    match state.store.add_monitor(&mut monitor) {
        Ok(_) => {
            tracing::info!("Added monitor {} ({})", monitor.name, monitor.id);
            (StatusCode::CREATED, Json(monitor)).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_delete_monitor(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.store.delete_monitor(id) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(DbError::NotFound) => (StatusCode::NOT_FOUND, "Monitor not found").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// API: Heartbeats
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub up: bool,
    /// RFC 3339; defaults to now.
    #[serde(default)]
    pub time: Option<String>,
}

pub async fn handle_record_heartbeat(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<HeartbeatRequest>,
) -> impl IntoResponse {
    let time = match req.time.as_deref().map(parse_time).transpose() {
        Ok(t) => t.unwrap_or_else(Utc::now),
        Err(resp) => return resp,
    };

    match state.store.get_monitor(id) {
        Ok(_) => {}
        Err(DbError::NotFound) => {
            return (StatusCode::NOT_FOUND, "Monitor not found").into_response()
        }
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }

    let heartbeat = Heartbeat {
        monitor_id: id,
        time,
        is_up: req.up,
    };

    match state.store.add_heartbeat(&heartbeat) {
        Ok(_) => (StatusCode::CREATED, Json(heartbeat)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// API: Downtime
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DowntimeQuery {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

pub async fn handle_get_downtime(
    State(state): State<AppState>,
    Query(query): Query<DowntimeQuery>,
) -> impl IntoResponse {
    let end = match query.end.as_deref().map(parse_time).transpose() {
        Ok(t) => t.unwrap_or_else(Utc::now),
        Err(resp) => return resp,
    };

    let start = match query.start.as_deref().map(parse_time).transpose() {
        Ok(Some(t)) => t,
        Ok(None) => {
            let hours = state.config.default_window_hours;
            match ChronoDuration::try_hours(i64::from(hours))
                .and_then(|span| end.checked_sub_signed(span))
            {
                Some(t) => t,
                None => {
                    return (
                        StatusCode::BAD_REQUEST,
                        format!("a {} hour window before {} is out of range; pass start", hours, end),
                    )
                        .into_response()
                }
            }
        }
        Err(resp) => return resp,
    };

    let window = match DowntimeWindow::new(start, end) {
        Ok(w) => w,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    match state.aggregator.compute(window).await {
        Ok(report) => Json(report).into_response(),
        Err(e @ DowntimeError::InvalidWindow { .. }) => {
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Parse an RFC 3339 timestamp. Values without an offset are rejected
/// rather than guessed at.
fn parse_time(s: &str) -> Result<DateTime<Utc>, Response> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("invalid timestamp {:?}: {}", s, e),
            )
                .into_response()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::db::Store;
    use crate::downtime::DowntimeAggregator;
    use chrono::TimeZone;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn state() -> (NamedTempFile, AppState) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let aggregator = Arc::new(DowntimeAggregator::new(store.clone(), store.clone(), 2));
        let state = AppState {
            config: ServerConfig::default(),
            store,
            aggregator,
        };
        (tmp, state)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_downtime_report_over_http() {
        let (_tmp, state) = state();
        let mut monitor = Monitor {
            name: "api".to_string(),
            url: "https://api.example.com".to_string(),
            ..Default::default()
        };
        let id = state.store.add_monitor(&mut monitor).unwrap();

        for (time, up) in [("2024-01-01T00:10:00Z", false), ("2024-01-01T00:25:00Z", true)] {
            let resp = handle_record_heartbeat(
                State(state.clone()),
                Path(id),
                Json(HeartbeatRequest {
                    up,
                    time: Some(time.to_string()),
                }),
            )
            .await
            .into_response();
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        let resp = handle_get_downtime(
            State(state.clone()),
            Query(DowntimeQuery {
                start: Some("2024-01-01T00:00:00Z".to_string()),
                end: Some("2024-01-01T01:00:00Z".to_string()),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["intervals"][0]["duration"], "00:15:00");
        assert_eq!(body["intervals"][0]["monitor_name"], "api");
        assert_eq!(body["totals"][0]["total_downtime"], "00:15:00");
        assert_eq!(body["totals"][0]["monitor_url"], "https://api.example.com");
    }

    #[tokio::test]
    async fn test_reversed_window_is_bad_request() {
        let (_tmp, state) = state();
        let resp = handle_get_downtime(
            State(state),
            Query(DowntimeQuery {
                start: Some("2024-01-01T01:00:00Z".to_string()),
                end: Some("2024-01-01T00:00:00Z".to_string()),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_default_window_is_bad_request() {
        let (_tmp, mut state) = state();
        state.config.default_window_hours = u32::MAX;

        let resp = handle_get_downtime(
            State(state),
            Query(DowntimeQuery {
                start: None,
                end: Some("2024-01-01T00:00:00Z".to_string()),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_default_window_ends_at_end() {
        let (_tmp, mut state) = state();
        state.config.default_window_hours = 2;

        let resp = handle_get_downtime(
            State(state),
            Query(DowntimeQuery {
                start: None,
                end: Some("2024-01-01T03:00:00Z".to_string()),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        let start: DateTime<Utc> = serde_json::from_value(body["window_start"].clone()).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_naive_timestamp_is_rejected() {
        let (_tmp, state) = state();
        let resp = handle_get_downtime(
            State(state),
            Query(DowntimeQuery {
                start: Some("2024-01-01 00:00:00".to_string()),
                end: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_offset_timestamps_are_normalized_to_utc() {
        let (_tmp, state) = state();
        let mut monitor = Monitor {
            name: "edge".to_string(),
            ..Default::default()
        };
        let id = state.store.add_monitor(&mut monitor).unwrap();

        let resp = handle_record_heartbeat(
            State(state.clone()),
            Path(id),
            Json(HeartbeatRequest {
                up: false,
                time: Some("2024-01-01T02:50:00+02:00".to_string()),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let stored = state
            .store
            .get_heartbeats(
                id,
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
            )
            .unwrap();
        assert_eq!(stored[0].time, Utc.with_ymd_and_hms(2024, 1, 1, 0, 50, 0).unwrap());
    }

    #[tokio::test]
    async fn test_heartbeat_for_unknown_monitor_is_not_found() {
        let (_tmp, state) = state();
        let resp = handle_record_heartbeat(
            State(state),
            Path(42),
            Json(HeartbeatRequest { up: true, time: None }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_and_delete_monitor() {
        let (_tmp, state) = state();
        let resp = handle_create_monitor(
            State(state.clone()),
            Json(CreateMonitorRequest {
                name: "  ".to_string(),
                url: String::new(),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = handle_create_monitor(
            State(state.clone()),
            Json(CreateMonitorRequest {
                name: "db".to_string(),
                url: "postgres://db".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let id = body_json(resp).await["id"].as_i64().unwrap();

        let resp = handle_delete_monitor(State(state.clone()), Path(id)).await.into_response();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let resp = handle_delete_monitor(State(state), Path(id)).await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
