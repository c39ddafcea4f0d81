use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::relay::RelayError;

/// Errors surfaced by the coordination core.
///
/// None of these are fatal: inside a tick they are logged and degrade to "no
/// state change", and callers of the explicit operations get them back as
/// values.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The relay is not reachable, so the session could not be created or joined.
    #[error("session service unavailable")]
    ConnectionUnavailable(#[source] RelayError),
    /// An inbound payload could not be decoded into an envelope.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    /// Enumerating the roster failed; the previous snapshot is kept.
    #[error("roster fetch failed")]
    RosterFetchFailure(#[source] RelayError),
    /// Observed state contradicts a protocol invariant (stale snapshot).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// The operation is reserved to the authoritative member.
    #[error("only the session owner may {0}")]
    NotOwner(&'static str),
    /// The coordinator was shut down.
    #[error("coordinator has been shut down")]
    Inactive,
    /// A read or write against the relay failed.
    #[error("relay call failed: {0}")]
    Relay(#[from] RelayError),
}

impl CoordinatorError {
    /// Classify a failed create or join: only an unreachable relay is an outage.
    pub fn from_entry(err: RelayError) -> Self {
        match err {
            RelayError::Unavailable(_) | RelayError::Transport(_) => {
                CoordinatorError::ConnectionUnavailable(err)
            }
            other => CoordinatorError::Relay(other),
        }
    }
}

/// Errors that can occur in the dev harness service layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No local participant with that name.
    #[error("unknown participant `{0}`")]
    UnknownParticipant(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The coordinator rejected the operation.
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Caller may not perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Relay unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::UnknownParticipant(name) => {
                AppError::NotFound(format!("participant `{name}`"))
            }
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::Coordinator(err) => err.into(),
        }
    }
}

impl From<CoordinatorError> for AppError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::NotOwner(_) => AppError::Forbidden(err.to_string()),
            CoordinatorError::MalformedEnvelope(message) => AppError::BadRequest(message),
            CoordinatorError::Inactive | CoordinatorError::InvariantViolation(_) => {
                AppError::Conflict(err.to_string())
            }
            CoordinatorError::Relay(RelayError::SessionNotFound(id)) => {
                AppError::NotFound(format!("session `{id}`"))
            }
            CoordinatorError::Relay(RelayError::SessionFull(id)) => {
                AppError::Conflict(format!("session `{id}` is full"))
            }
            CoordinatorError::Relay(RelayError::Forbidden(message)) => AppError::Forbidden(message),
            CoordinatorError::ConnectionUnavailable(source)
            | CoordinatorError::RosterFetchFailure(source)
            | CoordinatorError::Relay(source) => AppError::ServiceUnavailable(source.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::SessionId;

    #[test]
    fn only_an_unreachable_relay_counts_as_unavailable() {
        let down = CoordinatorError::from_entry(RelayError::Unavailable("offline".into()));
        assert!(matches!(down, CoordinatorError::ConnectionUnavailable(_)));

        let full = CoordinatorError::from_entry(RelayError::SessionFull(SessionId::new()));
        assert!(matches!(
            full,
            CoordinatorError::Relay(RelayError::SessionFull(_))
        ));
    }

    #[test]
    fn entry_errors_map_to_distinct_statuses() {
        let status = |err: CoordinatorError| AppError::from(err).into_response().status();
        let id = SessionId::new();

        assert_eq!(
            status(CoordinatorError::from_entry(RelayError::SessionFull(id))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(CoordinatorError::from_entry(RelayError::SessionNotFound(id))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(CoordinatorError::from_entry(RelayError::Unavailable(
                "offline".into()
            ))),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
