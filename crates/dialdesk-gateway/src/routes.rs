//! API route handlers for the gateway.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use dialdesk_core::DialDeskError;
use dialdesk_core::traits::FixedAnswer;

use crate::server::AppState;

type Reply = (StatusCode, Json<serde_json::Value>);

fn ok(body: serde_json::Value) -> Reply {
    (StatusCode::OK, Json(body))
}

fn fail(e: DialDeskError) -> Reply {
    let status = match &e {
        DialDeskError::NotFound(_) => StatusCode::NOT_FOUND,
        DialDeskError::Validation(_) => StatusCode::BAD_REQUEST,
        e if e.is_transient() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({"ok": false, "error": e.to_string()})))
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "dialdesk-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// System information endpoint.
pub async fn system_info(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stats = state.engine.lead_refresh_stats();
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "active": state.engine.is_active(),
        "notify_targets": state.notifications.target_names(),
        "lead_refresh": {
            "succeeded": stats.succeeded(),
            "retried": stats.retried(),
            "abandoned": stats.abandoned(),
        },
        "gateway": {
            "host": state.gateway_config.host,
            "port": state.gateway_config.port,
        }
    }))
}

/// Ordered worklist with priorities and countdowns.
pub async fn worklist(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let entries = state.engine.snapshot().await;
    Json(serde_json::json!({
        "ok": true,
        "now": state.engine.now().to_rfc3339(),
        "count": entries.len(),
        "entries": entries,
    }))
}

/// Reminder history.
pub async fn notifications(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let history: Vec<_> = state
        .notifications
        .history()
        .iter()
        .map(|n| {
            serde_json::json!({
                "title": n.title,
                "body": n.body,
                "source": n.source,
                "priority": format!("{:?}", n.priority).to_lowercase(),
                "fields": n.fields.iter().cloned().collect::<std::collections::HashMap<_, _>>(),
                "timestamp": n.timestamp.to_rfc3339(),
            })
        })
        .collect();
    Json(serde_json::json!({"ok": true, "notifications": history}))
}

/// User-initiated refresh: errors are reported.
pub async fn refresh(State(state): State<Arc<AppState>>) -> Reply {
    match state.engine.refresh_leads(false).await {
        Ok(count) => ok(serde_json::json!({"ok": true, "leads": count})),
        Err(e) => fail(e),
    }
}

pub async fn mark_connected(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Reply {
    match state.engine.mark_connected(&id).await {
        Ok(()) => ok(serde_json::json!({"ok": true, "lead_id": id, "status": "connected"})),
        Err(e) => fail(e),
    }
}

/// Body: `{"confirm": bool}`. Without a confirmation no follow-up is booked.
pub async fn mark_not_connected(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Reply {
    let confirm = serde_json::from_slice::<serde_json::Value>(&body)
        .ok()
        .and_then(|b| b["confirm"].as_bool())
        .unwrap_or(false);
    match state
        .engine
        .mark_not_connected(&id, &FixedAnswer(confirm))
        .await
    {
        Ok(outcome) => ok(serde_json::json!({
            "ok": true,
            "lead_id": id,
            "result": outcome,
        })),
        Err(e) => fail(e),
    }
}

/// Body: `{"time": "<rfc3339>"}`.
pub async fn schedule_call(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Reply {
    let time = match body["time"].as_str().filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                return fail(DialDeskError::Validation(format!("invalid time '{raw}': {e}")));
            }
        },
    };
    match state.engine.schedule_or_update(&id, time).await {
        Ok(call) => ok(serde_json::json!({"ok": true, "call": call})),
        Err(e) => fail(e),
    }
}

pub async fn complete_call(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Reply {
    match state.engine.complete_call(&id).await {
        Ok(lead) => ok(serde_json::json!({"ok": true, "lead": lead})),
        Err(e) => fail(e),
    }
}

pub async fn delete_call(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Reply {
    match state.engine.delete_scheduled_call(&id).await {
        Ok(call) => ok(serde_json::json!({"ok": true, "deleted": call.id})),
        Err(e) => fail(e),
    }
}
