use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether every hosted participant is still attached to the lobby.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let participants = state.participants();
    let mut active = 0;
    for (name, coordinator) in &participants {
        if coordinator.lock().await.is_active() {
            active += 1;
        } else {
            warn!(participant = %name, "participant has left the lobby");
        }
    }

    if active == participants.len() && active > 0 {
        HealthResponse::ok(active)
    } else {
        HealthResponse::degraded(active)
    }
}
