use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::session::{
        CreateSessionRequest, JoinSessionRequest, SessionExistsResponse, SessionSummary,
        UpdateStatusRequest,
    },
    error::AppError,
    routes::extract::AppJson,
    services::session_service,
    state::SharedState,
};

/// Session lifecycle endpoints used by the lobby.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/exists", get(session_exists))
        .route("/sessions/{id}/join", post(join_session))
        .route("/sessions/{id}/status", put(update_status))
}

/// Open a new session, optionally joined by its creator. The body may be omitted.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = SessionSummary),
        (status = 400, description = "Invalid username"),
        (status = 415, description = "Body sent without a JSON content type"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    payload: Option<AppJson<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<SessionSummary>), AppError> {
    let payload = payload.map(|AppJson(body)| body).unwrap_or_default();
    payload.validate()?;
    let session = session_service::create_session(&state, payload.username).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session", body = SessionSummary),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    Ok(Json(session_service::get_session(&state, id).await?))
}

/// Lightweight probe used before joining.
#[utoipa::path(
    get,
    path = "/sessions/{id}/exists",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    responses((status = 200, description = "Whether the session exists", body = SessionExistsResponse))
)]
pub async fn session_exists(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionExistsResponse>, AppError> {
    let exists = session_service::session_exists(&state, id).await?;
    Ok(Json(SessionExistsResponse { exists }))
}

/// Add a player to the session. Joining twice returns the session unchanged.
#[utoipa::path(
    post,
    path = "/sessions/{id}/join",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Updated session", body = SessionSummary),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "Session kept changing concurrently")
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<JoinSessionRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    payload.validate()?;
    Ok(Json(
        session_service::join_session(&state, id, &payload.username).await?,
    ))
}

#[utoipa::path(
    put,
    path = "/sessions/{id}/status",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Updated session", body = SessionSummary),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn update_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateStatusRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    Ok(Json(
        session_service::update_status(&state, id, payload.status).await?,
    ))
}
