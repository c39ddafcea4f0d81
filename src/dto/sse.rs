use std::time::SystemTime;

use serde::Serialize;
use utoipa::ToSchema;

use crate::{dto::format_system_time, session::CoordinatorEvent};

#[derive(Clone, Debug)]
/// Dispatched payload carried across the SSE channel.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Participants hosted by this process.
    pub participants: Vec<String>,
    /// RFC 3339 connection time.
    pub connected_at: String,
}

impl Handshake {
    /// Build the handshake for the given participant names.
    pub fn new(participants: Vec<String>) -> Self {
        Self {
            message: "lobby stream connected".into(),
            participants,
            connected_at: format_system_time(SystemTime::now()),
        }
    }
}

#[derive(Debug, Serialize)]
/// A coordinator event tagged with the participant that observed it.
pub struct ParticipantEvent<'a> {
    /// Display name of the observing participant.
    pub participant: &'a str,
    /// The event itself, flattened (`type` plus its fields).
    #[serde(flatten)]
    pub event: &'a CoordinatorEvent,
}
