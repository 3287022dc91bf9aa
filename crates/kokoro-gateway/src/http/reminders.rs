//! Reminder record API. Every route is scoped to the calling owner.
//!
//! ```text
//! GET    /api/reminders?status=&page=&limit=
//! POST   /api/reminders
//! GET    /api/reminders/{id}
//! PATCH  /api/reminders/{id}
//! POST   /api/reminders/{id}/cancel
//! DELETE /api/reminders/{id}
//! ```

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use kokoro_core::types::{Priority, Recurrence, ReminderId, ReminderStatus};
use kokoro_reminders::{NewReminder, ReminderFilter, ReminderPatch};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::auth::Caller;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

impl ListQuery {
    fn filter(&self) -> ApiResult<ReminderFilter> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(s) => Some(
                s.parse::<ReminderStatus>()
                    .map_err(ApiError::bad_request)?,
            ),
        };
        let defaults = ReminderFilter::default();
        let number = |raw: &Option<String>, fallback: u32| {
            raw.as_deref()
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(fallback)
        };
        Ok(ReminderFilter {
            status,
            page: number(&self.page, defaults.page),
            limit: number(&self.limit, defaults.limit),
        }
        .normalized())
    }
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let page = state.reminders.list(&caller.user_id, &query.filter()?)?;
    Ok(Json(json!({
        "reminders": page.items,
        "pagination": {
            "total": page.total,
            "page": page.page,
            "limit": page.limit,
            "pages": page.pages,
        },
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody {
    title: Option<String>,
    description: Option<String>,
    scheduled_at: Option<DateTime<Utc>>,
    recurrence: Option<Recurrence>,
    priority: Option<Priority>,
    email: Option<String>,
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid request body: {e}")))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let body: CreateBody = parse_body(&body)?;
    let title = body
        .title
        .ok_or_else(|| ApiError::bad_request("title is required"))?;
    let scheduled_at = body
        .scheduled_at
        .ok_or_else(|| ApiError::bad_request("scheduledAt is required"))?;
    let email = body
        .email
        .filter(|e| !e.trim().is_empty())
        .or(caller.email)
        .ok_or_else(|| ApiError::bad_request("no delivery address: set email"))?;

    let reminder = state.reminders.create(
        &caller.user_id,
        NewReminder {
            title,
            description: body.description,
            scheduled_at,
            recurrence: body.recurrence.unwrap_or_default(),
            priority: body.priority.unwrap_or_default(),
            email,
        },
    )?;
    Ok((StatusCode::CREATED, Json(json!({ "reminder": reminder }))))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let reminder = state.reminders.get(&caller.user_id, &ReminderId::from(id))?;
    Ok(Json(json!({ "reminder": reminder })))
}

/// PATCH accepts the editable fields plus `status: "cancelled"`, which is
/// routed to the cancel path after any field edits.
pub async fn update(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let mut raw: Value = parse_body(&body)?;
    let status = match raw.as_object_mut() {
        Some(fields) => fields.remove("status"),
        None => return Err(ApiError::bad_request("request body must be an object")),
    };
    let cancel = match status {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) if s == ReminderStatus::Cancelled.as_str() => true,
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "status can only be set to \"cancelled\", got {other}"
            )))
        }
    };
    let patch: ReminderPatch = serde_json::from_value(raw)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {e}")))?;

    let id = ReminderId::from(id);
    let mut reminder = if patch.is_empty() {
        state.reminders.get(&caller.user_id, &id)?
    } else {
        state.reminders.update(&caller.user_id, &id, patch)?
    };
    if cancel {
        reminder = state.reminders.cancel(&caller.user_id, &id)?;
    }
    Ok(Json(json!({ "reminder": reminder })))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let reminder = state.reminders.cancel(&caller.user_id, &ReminderId::from(id))?;
    Ok(Json(json!({ "reminder": reminder })))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let reminder = state.reminders.delete(&caller.user_id, &ReminderId::from(id))?;
    Ok(Json(json!({ "success": true, "reminder": reminder })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(status: Option<&str>, page: Option<&str>, limit: Option<&str>) -> ListQuery {
        ListQuery {
            status: status.map(String::from),
            page: page.map(String::from),
            limit: limit.map(String::from),
        }
    }

    #[test]
    fn list_query_defaults_and_clamps() {
        let f = query(None, None, None).filter().unwrap();
        assert_eq!((f.status, f.page, f.limit), (None, 1, 50));

        let f = query(Some("all"), Some("0"), Some("1000")).filter().unwrap();
        assert_eq!((f.status, f.page, f.limit), (None, 1, 100));

        let f = query(Some("sent"), Some("abc"), Some("10")).filter().unwrap();
        assert_eq!((f.status, f.page, f.limit), (Some(ReminderStatus::Sent), 1, 10));
    }

    #[test]
    fn unknown_status_is_a_bad_request() {
        let err = query(Some("done"), None, None).filter().unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
