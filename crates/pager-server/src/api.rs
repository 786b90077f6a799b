use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use pager_shared::types::Topic;

use crate::broker::BrokerHandle;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::users::{UserRecord, UserStore, UserStoreError};

#[derive(Clone)]
pub struct AppState {
    pub broker: BrokerHandle,
    pub users: UserStore,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/notify/v1/test", get(notify_test))
        .route("/notify/v1/send/message", post(send_message))
        .route("/user/v1/test", get(user_test))
        .route("/user/v1/register", post(register_user))
        .route("/user/v1/login", post(login_user))
        .route("/user/v1/all", get(all_users))
        .route("/user/v1/id/:id", get(user_by_id))
        .route("/user/v1/:id", delete(delete_user))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    instance: String,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        instance: state.config.instance_name.clone(),
    })
}

async fn notify_test() -> &'static str {
    "Pager notify service is running successfully"
}

async fn user_test() -> &'static str {
    "Pager user service is running successfully"
}

#[derive(Debug, Deserialize)]
struct SendParams {
    topic: String,
    message: String,
}

/// Relay a message into the recipient's inbox topic.
///
/// `topic` is the plain recipient name; the configured namespace prefix is
/// applied here, matching what the recipient's console subscribes to.
async fn send_message(
    State(state): State<AppState>,
    Query(params): Query<SendParams>,
) -> Result<String, ApiError> {
    let message = params.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    let topic = Topic::new(state.config.namespace, &params.topic)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    state
        .broker
        .publish(topic.to_string(), message.as_bytes().to_vec())
        .await
        .map_err(ApiError::DeliveryFailed)?;

    info!(topic = %topic, "Relayed message");
    Ok(format!("Message sent to {}", topic.name()))
}

#[derive(Debug, Deserialize)]
struct UserRequest {
    username: String,
}

async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<UserRequest>,
) -> Result<(StatusCode, Json<UserRecord>), ApiError> {
    let user = state.users.register(&request.username).map_err(|e| match e {
        UserStoreError::EmptyName => ApiError::BadRequest(e.to_string()),
        UserStoreError::NameTaken(_) => ApiError::Conflict(e.to_string()),
    })?;

    info!(user = %user.name, id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login_user(
    State(state): State<AppState>,
    Json(request): Json<UserRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    state
        .users
        .by_name(&request.username)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("user not found: {}", request.username.trim())))
}

async fn all_users(State(state): State<AppState>) -> Json<Vec<UserRecord>> {
    Json(state.users.list())
}

async fn user_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserRecord>, ApiError> {
    state
        .users
        .by_id(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("user not found: {id}")))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.users.delete(id) {
        info!(id = %id, "User deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("user not found: {id}")))
    }
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
