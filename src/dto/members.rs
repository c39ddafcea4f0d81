//! DTOs of the per-participant REST API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::session::{PausePhase, SessionCoordinator, VoteOutcome};

/// One lobby member as seen by a participant.
#[derive(Debug, Serialize, ToSchema)]
pub struct MemberSummary {
    pub id: u64,
    pub name: String,
    pub ready: bool,
}

/// Pause state as last observed by a participant.
#[derive(Debug, Serialize, ToSchema)]
pub struct PauseSummary {
    pub paused: bool,
    pub initiator: String,
    pub votes: u32,
    pub total: u32,
}

/// Everything a participant's coordinator currently knows about its session.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSnapshot {
    pub participant: String,
    pub member_id: u64,
    pub session_id: String,
    pub owner_id: u64,
    pub owner: bool,
    pub active: bool,
    pub members: Vec<MemberSummary>,
    pub all_ready: bool,
    pub countdown_running: bool,
    pub pause: PauseSummary,
    pub started: bool,
}

impl SessionSnapshot {
    /// Project a coordinator into its REST representation.
    pub fn from_coordinator(participant: &str, coordinator: &SessionCoordinator) -> Self {
        let statuses = coordinator.ready_statuses();
        let members = coordinator
            .members()
            .map(|member| MemberSummary {
                id: member.id.0,
                name: member.name.clone(),
                ready: statuses.get(&member.id).copied().unwrap_or(false),
            })
            .collect();
        let pause = coordinator.pause_snapshot();

        Self {
            participant: participant.to_string(),
            member_id: coordinator.local_member().id.0,
            session_id: coordinator.session_id().to_string(),
            owner_id: coordinator.owner().0,
            owner: coordinator.is_owner(),
            active: coordinator.is_active(),
            members,
            all_ready: coordinator.is_all_ready(),
            countdown_running: coordinator.countdown_running(),
            pause: PauseSummary {
                paused: pause.paused,
                initiator: pause.initiator.clone(),
                votes: pause.votes,
                total: pause.total,
            },
            started: coordinator.has_started(),
        }
    }
}

/// Request to set the participant's ready flag.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReadyRequest {
    pub ready: bool,
}

/// Chat line to send on behalf of a participant.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 256))]
    pub message: String,
}

/// Result of a vote action.
#[derive(Debug, Serialize, ToSchema)]
pub struct VoteResponse {
    /// `cast`, `paused_immediately` or `rejected`.
    pub outcome: String,
    /// Phase the vote was cast in, when it was cast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// New value of the participant's vote flag, when it was cast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<bool>,
}

impl From<VoteOutcome> for VoteResponse {
    fn from(outcome: VoteOutcome) -> Self {
        match outcome {
            VoteOutcome::Cast { phase, vote } => Self {
                outcome: "cast".into(),
                phase: Some(
                    match phase {
                        PausePhase::Running => "running",
                        PausePhase::Paused => "paused",
                    }
                    .into(),
                ),
                vote: Some(vote),
            },
            VoteOutcome::PausedImmediately => Self {
                outcome: "paused_immediately".into(),
                phase: None,
                vote: None,
            },
            VoteOutcome::Rejected => Self {
                outcome: "rejected".into(),
                phase: None,
                vote: None,
            },
        }
    }
}

/// Generic acknowledgement returned by action endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub message: String,
}

impl ActionResponse {
    /// Build an acknowledgement.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_rejects_empty_and_oversized_lines() {
        let empty = ChatRequest {
            message: String::new(),
        };
        assert!(empty.validate().is_err());

        let long = ChatRequest {
            message: "x".repeat(257),
        };
        assert!(long.validate().is_err());

        let fine = ChatRequest {
            message: "gg".into(),
        };
        assert!(fine.validate().is_ok());
    }

    #[test]
    fn vote_response_reports_phase_only_for_cast_votes() {
        let cast = VoteResponse::from(VoteOutcome::Cast {
            phase: PausePhase::Paused,
            vote: true,
        });
        assert_eq!(cast.phase.as_deref(), Some("paused"));
        assert_eq!(cast.vote, Some(true));

        let rejected = VoteResponse::from(VoteOutcome::Rejected);
        assert_eq!(rejected.outcome, "rejected");
        assert!(rejected.phase.is_none());
    }
}
