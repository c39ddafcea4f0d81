use std::sync::Arc;

use tracing::{info, warn};
use validator::Validate;

use crate::{
    dto::members::{ActionResponse, ChatRequest, ReadyRequest, SessionSnapshot, VoteResponse},
    error::{CoordinatorError, ServiceError},
    session::SessionCoordinator,
    state::{SharedCoordinator, SharedState},
};

/// Create the lobby as the configured host and join every configured peer.
pub async fn bootstrap(state: &SharedState) -> Result<(), CoordinatorError> {
    let config = state.config();
    let settings = config.coordinator_settings();

    let host = SessionCoordinator::create(
        Arc::new(state.relay().connect(config.host_name.clone())),
        settings.clone(),
    )
    .await?;
    let session = host.session_id();
    state.add_participant(config.host_name.clone(), host);

    for peer in &config.peers {
        let coordinator = SessionCoordinator::join(
            Arc::new(state.relay().connect(peer.clone())),
            session,
            settings.clone(),
        )
        .await?;
        state.add_participant(peer.clone(), coordinator);
    }

    info!(
        session = %session,
        host = %config.host_name,
        peers = config.peers.len(),
        "lobby bootstrapped"
    );
    Ok(())
}

/// Leave the lobby with every participant, peers first so the host leaves last.
pub async fn shutdown_all(state: &SharedState) {
    let host = state.config().host_name.clone();
    let mut participants = state.participants();
    participants.sort_by_key(|(name, _)| *name == host);

    for (name, coordinator) in participants {
        if let Err(err) = coordinator.lock().await.shutdown() {
            warn!(participant = %name, error = %err, "participant failed to leave cleanly");
        }
    }
}

fn participant(state: &SharedState, name: &str) -> Result<SharedCoordinator, ServiceError> {
    state
        .participant(name)
        .ok_or_else(|| ServiceError::UnknownParticipant(name.to_string()))
}

/// What the participant's coordinator currently knows.
pub async fn session_snapshot(
    state: &SharedState,
    name: &str,
) -> Result<SessionSnapshot, ServiceError> {
    let coordinator = participant(state, name)?;
    let guard = coordinator.lock().await;
    Ok(SessionSnapshot::from_coordinator(name, &guard))
}

/// Set the participant's ready flag.
pub async fn set_ready(
    state: &SharedState,
    name: &str,
    request: ReadyRequest,
) -> Result<ActionResponse, ServiceError> {
    let coordinator = participant(state, name)?;
    coordinator.lock().await.set_local_ready(request.ready)?;
    Ok(ActionResponse::new(format!(
        "{name} is {}",
        if request.ready { "ready" } else { "not ready" }
    )))
}

/// Flip the participant's pause/resume vote.
pub async fn toggle_vote(state: &SharedState, name: &str) -> Result<VoteResponse, ServiceError> {
    let coordinator = participant(state, name)?;
    let outcome = coordinator.lock().await.toggle_vote()?;
    Ok(outcome.into())
}

/// Vote for pausing on behalf of the participant.
pub async fn request_pause(state: &SharedState, name: &str) -> Result<VoteResponse, ServiceError> {
    let coordinator = participant(state, name)?;
    let outcome = coordinator.lock().await.request_pause()?;
    Ok(outcome.into())
}

/// Start the game; only the host may.
pub async fn signal_start(state: &SharedState, name: &str) -> Result<ActionResponse, ServiceError> {
    let coordinator = participant(state, name)?;
    coordinator.lock().await.signal_start()?;
    Ok(ActionResponse::new("game start signalled"))
}

/// Send a chat line on behalf of the participant.
pub async fn send_chat(
    state: &SharedState,
    name: &str,
    request: ChatRequest,
) -> Result<ActionResponse, ServiceError> {
    request.validate()?;
    let coordinator = participant(state, name)?;
    coordinator.lock().await.send_chat(request.message)?;
    Ok(ActionResponse::new("chat message sent"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};

    fn lobby_config() -> AppConfig {
        AppConfig {
            host_name: "Ada".into(),
            peers: vec!["Bob".into()],
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_registers_host_and_peers() {
        let state = AppState::new(lobby_config());
        bootstrap(&state).await.unwrap();

        let host = session_snapshot(&state, "Ada").await.unwrap();
        let peer = session_snapshot(&state, "Bob").await.unwrap();
        assert!(host.owner);
        assert!(!peer.owner);
        assert_eq!(host.session_id, peer.session_id);
    }

    #[tokio::test]
    async fn unknown_participant_is_reported() {
        let state = AppState::new(lobby_config());
        bootstrap(&state).await.unwrap();

        let err = toggle_vote(&state, "Zed").await.unwrap_err();
        assert!(matches!(err, ServiceError::UnknownParticipant(_)));
    }

    #[tokio::test]
    async fn peer_cannot_start_the_game() {
        let state = AppState::new(lobby_config());
        bootstrap(&state).await.unwrap();

        let err = signal_start(&state, "Bob").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Coordinator(CoordinatorError::NotOwner(_))
        ));
        assert!(signal_start(&state, "Ada").await.is_ok());
    }

    #[tokio::test]
    async fn empty_chat_is_rejected_before_sending() {
        let state = AppState::new(lobby_config());
        bootstrap(&state).await.unwrap();

        let err = send_chat(
            &state,
            "Bob",
            ChatRequest {
                message: String::new(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn shutdown_all_empties_the_lobby() {
        let state = AppState::new(lobby_config());
        bootstrap(&state).await.unwrap();
        let host = state.participant("Ada").unwrap();
        let session = host.lock().await.session_id();

        shutdown_all(&state).await;

        for (_, coordinator) in state.participants() {
            assert!(!coordinator.lock().await.is_active());
        }
        assert!(!state.relay().session_exists(session));
    }
}
