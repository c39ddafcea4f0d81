use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use crate::{
    dto::members::{ActionResponse, ChatRequest, ReadyRequest, SessionSnapshot, VoteResponse},
    error::AppError,
    services::participant_service,
    state::SharedState,
};

/// Per-participant endpoints acting on behalf of a hosted lobby member.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/members/{name}/session", get(get_session))
        .route("/members/{name}/ready", post(set_ready))
        .route("/members/{name}/vote", post(toggle_vote))
        .route("/members/{name}/pause", post(request_pause))
        .route("/members/{name}/start", post(signal_start))
        .route("/members/{name}/chat", post(send_chat))
}

#[utoipa::path(
    get,
    path = "/members/{name}/session",
    tag = "members",
    params(("name" = String, Path, description = "Participant display name")),
    responses(
        (status = 200, description = "Session as seen by the participant", body = SessionSnapshot),
        (status = 404, description = "Unknown participant")
    )
)]
/// Return what the participant's coordinator currently knows.
pub async fn get_session(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let snapshot = participant_service::session_snapshot(&state, &name).await?;
    Ok(Json(snapshot))
}

#[utoipa::path(
    post,
    path = "/members/{name}/ready",
    tag = "members",
    params(("name" = String, Path, description = "Participant display name")),
    request_body = ReadyRequest,
    responses(
        (status = 200, description = "Ready flag written", body = ActionResponse),
        (status = 404, description = "Unknown participant"),
        (status = 503, description = "Relay unavailable")
    )
)]
/// Set the participant's ready flag.
pub async fn set_ready(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(request): Json<ReadyRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let response = participant_service::set_ready(&state, &name, request).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/members/{name}/vote",
    tag = "members",
    params(("name" = String, Path, description = "Participant display name")),
    responses(
        (status = 200, description = "Vote toggled", body = VoteResponse),
        (status = 404, description = "Unknown participant")
    )
)]
/// Flip the participant's pause/resume vote.
pub async fn toggle_vote(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<VoteResponse>, AppError> {
    let response = participant_service::toggle_vote(&state, &name).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/members/{name}/pause",
    tag = "members",
    params(("name" = String, Path, description = "Participant display name")),
    responses(
        (status = 200, description = "Pause requested, or rejected while already paused", body = VoteResponse),
        (status = 404, description = "Unknown participant")
    )
)]
/// Vote for pausing the game.
pub async fn request_pause(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<VoteResponse>, AppError> {
    let response = participant_service::request_pause(&state, &name).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/members/{name}/start",
    tag = "members",
    params(("name" = String, Path, description = "Participant display name")),
    responses(
        (status = 200, description = "Game start signalled", body = ActionResponse),
        (status = 403, description = "Participant does not own the session"),
        (status = 404, description = "Unknown participant")
    )
)]
/// Signal the game start; only the session owner may.
pub async fn signal_start(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    let response = participant_service::signal_start(&state, &name).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/members/{name}/chat",
    tag = "members",
    params(("name" = String, Path, description = "Participant display name")),
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Chat line sent", body = ActionResponse),
        (status = 400, description = "Empty or oversized message"),
        (status = 404, description = "Unknown participant")
    )
)]
/// Send a chat line on behalf of the participant.
pub async fn send_chat(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let response = participant_service::send_chat(&state, &name, request).await?;
    Ok(Json(response))
}
