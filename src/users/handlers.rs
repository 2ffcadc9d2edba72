use std::future::Future;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{error, instrument, warn};

use crate::{
    error::StoreError,
    state::AppState,
    users::{
        dto::{ErrorResponse, HealthResponse, MessageResponse, UserEnvelope},
        repo_types::{NewUser, UpdateUser, User},
    },
};

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user", get(list_users).post(add_user))
        .route(
            "/user/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let limit = state.config.request_timeout;
    let users = within(limit, "get_all_users", state.users.get_all_users())
        .await
        .map_err(reject)?;
    Ok(Json(users))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let limit = state.config.request_timeout;
    let user = within(limit, "get_user_by_id", state.users.get_user_by_id(&id))
        .await
        .map_err(reject)?;
    Ok(Json(user))
}

#[instrument(skip(state, payload))]
pub async fn add_user(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> Result<Json<UserEnvelope>, ApiError> {
    if payload.username.is_empty() || payload.password.is_empty() {
        warn!("username or password missing");
        return Err(bad_request("username and password are required"));
    }

    let limit = state.config.request_timeout;
    let user = within(limit, "add_user", state.users.add_user(payload))
        .await
        .map_err(reject)?;
    Ok(Json(UserEnvelope {
        message: "add user success",
        user,
    }))
}

#[instrument(skip(state, patch))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<UpdateUser>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let limit = state.config.request_timeout;
    let user = within(limit, "update_user", state.users.update_user(&id, patch))
        .await
        .map_err(reject)?;
    Ok(Json(UserEnvelope {
        message: "user updated successfully",
        user,
    }))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let limit = state.config.request_timeout;
    within(limit, "delete_user", state.users.delete_user(&id))
        .await
        .map_err(reject)?;
    Ok(Json(MessageResponse {
        message: "user deleted successfully",
    }))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let limit = state.config.request_timeout;
    match within(limit, "ping", state.users.ping()).await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "healthy" })),
        Err(e) => {
            warn!(error = %e, "health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy",
                }),
            )
        }
    }
}

/// Bounds a service call by the request deadline.
async fn within<T, F>(limit: Duration, op: &'static str, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout { op, after: limit })?
}

/// NotFound is a 404, every other store error a 500.
fn status_for(e: &StoreError) -> StatusCode {
    if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn reject(e: StoreError) -> ApiError {
    let status = status_for(&e);
    if e.is_not_found() {
        warn!(error = %e, "request for missing user");
    } else {
        error!(error = %e, "request failed");
    }
    (status, Json(ErrorResponse { error: e.to_string() }))
}

fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}
