use tracing::warn;

use crate::{
    dto::sse::{Handshake, ParticipantEvent, ServerEvent},
    session::CoordinatorEvent,
    state::SharedState,
};

const EVENT_PREFIX: &str = "lobby";
const EVENT_HANDSHAKE: &str = "handshake";

/// Broadcast every event a participant's tick produced, in order.
pub fn broadcast_coordinator_events(
    state: &SharedState,
    participant: &str,
    events: &[CoordinatorEvent],
) {
    for event in events {
        let payload = ParticipantEvent { participant, event };
        send_event(state, &format!("{EVENT_PREFIX}.{}", event.kind()), &payload);
    }
}

/// Greet a freshly connected SSE client.
pub fn broadcast_handshake(state: &SharedState) {
    let names = state
        .participants()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    send_event(state, EVENT_HANDSHAKE, &Handshake::new(names));
}

fn send_event<T: serde::Serialize>(state: &SharedState, event: &str, payload: &T) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(message) => state.events().broadcast(message),
        Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
    }
}
