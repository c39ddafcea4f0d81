use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Participants still attached to the lobby.
    pub active_participants: usize,
}

impl HealthResponse {
    /// Every participant is still attached.
    pub fn ok(active_participants: usize) -> Self {
        Self {
            status: "ok".to_string(),
            active_participants,
        }
    }

    /// The host or some participant has left the lobby.
    pub fn degraded(active_participants: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            active_participants,
        }
    }
}
