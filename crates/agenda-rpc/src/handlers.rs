//! REST request handlers.

use crate::server::AppState;
use agenda_core::{AgendaError, Contact};
use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Message returned for errors that must not leak internals.
const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub path: String,
}

/// An `AgendaError` bound to the request path it occurred on.
pub struct ApiError {
    error: AgendaError,
    path: String,
}

impl ApiError {
    pub fn new(error: AgendaError, uri: &Uri) -> Self {
        Self {
            error,
            path: uri.path().to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        if status >= 500 {
            error!("Request to {} failed: {}", self.path, self.error);
        } else {
            debug!("Request to {} rejected: {}", self.path, self.error);
        }

        // upstream and internal details stay in the logs
        let message = if matches!(status, 500 | 502) {
            GENERIC_ERROR_MESSAGE.to_string()
        } else {
            self.error.to_string()
        };

        let body = ErrorResponse {
            status,
            message,
            timestamp: Utc::now(),
            path: self.path,
        };
        let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (code, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Breaker, cache and counter snapshot.
pub async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.api.status())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

/// All contacts, or a single upstream page when `page`/`pageSize` are given.
pub async fn handle_list_contacts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
    uri: Uri,
) -> ApiResult<Response> {
    if query.page.is_none() && query.page_size.is_none() {
        let contacts = state
            .api
            .get_all_contacts()
            .await
            .map_err(|e| ApiError::new(e, &uri))?;
        return Ok(Json(contacts).into_response());
    }

    let page = state
        .api
        .get_contacts_page(query.page, query.page_size)
        .await
        .map_err(|e| ApiError::new(e, &uri))?;
    if page.is_fallback() {
        warn!("Serving fallback page for {}", uri.path());
    }
    Ok(Json(page.contacts).into_response())
}

pub async fn handle_get_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    uri: Uri,
) -> ApiResult<Json<Contact>> {
    let contact = state
        .api
        .get_contact(id)
        .await
        .map_err(|e| ApiError::new(e, &uri))?;
    Ok(Json(contact))
}

pub async fn handle_create_contact(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    Json(contact): Json<Contact>,
) -> ApiResult<(StatusCode, Json<Contact>)> {
    let created = state
        .api
        .create_contact(contact)
        .await
        .map_err(|e| ApiError::new(e, &uri))?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn handle_update_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    uri: Uri,
    Json(contact): Json<Contact>,
) -> ApiResult<Json<Contact>> {
    let updated = state
        .api
        .update_contact(id, contact)
        .await
        .map_err(|e| ApiError::new(e, &uri))?;
    Ok(Json(updated))
}

pub async fn handle_delete_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    uri: Uri,
) -> ApiResult<StatusCode> {
    state
        .api
        .delete_contact(id)
        .await
        .map_err(|e| ApiError::new(e, &uri))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Drop the cached copy of one contact.
pub async fn handle_invalidate_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let existed = state.api.invalidate_contact(id);
    Json(json!({"id": id, "invalidated": existed}))
}

/// Force both circuit breakers closed.
pub async fn handle_reset_circuits(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.api.reset_circuits();
    Json(json!({"status": "reset"}))
}
