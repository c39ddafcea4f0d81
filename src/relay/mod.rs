//! Interface to the external session/relay service the coordinator is built on.
//!
//! The relay owns lobby creation, member enumeration, the shared and per-member
//! key-value stores, and the raw message transport. Everything here is consumed,
//! never implemented, by the coordination core; [`loopback`] provides an
//! in-process implementation for the dev harness and the tests.

pub mod loopback;

use std::fmt;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Result alias for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Error raised by a relay backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The relay is not reachable or not initialised.
    #[error("relay unavailable: {0}")]
    Unavailable(String),
    /// The session does not exist (anymore).
    #[error("session `{0}` not found")]
    SessionNotFound(SessionId),
    /// The session already holds its maximum number of members.
    #[error("session `{0}` is full")]
    SessionFull(SessionId),
    /// The caller is not allowed to perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// A transient transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Identifier of a session (lobby) on the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Allocate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Stable identity of a participant, as assigned by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A participant as enumerated by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Stable identity.
    pub id: MemberId,
    /// Display name.
    pub name: String,
}

impl Member {
    /// Build a member from its identity and display name.
    pub fn new(id: MemberId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// What the relay tells a process after creating or joining a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Session identifier.
    pub id: SessionId,
    /// The authoritative member (the creator). Never changes.
    pub owner: MemberId,
    /// Capacity requested at creation.
    pub max_members: usize,
}

/// Direction of a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    /// The member entered the session.
    Entered,
    /// The member left or disconnected.
    Left,
}

/// Asynchronous notification queued by the relay until the next poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Someone entered or left the session.
    MembershipChanged {
        /// Member concerned by the change.
        member: Member,
        /// Direction of the change.
        change: MembershipChange,
    },
    /// A shared metadata key was written.
    SharedDataChanged {
        /// Key that was written.
        key: String,
    },
    /// A per-member metadata key was written.
    MemberDataChanged {
        /// Owner of the written metadata.
        member: MemberId,
        /// Key that was written.
        key: String,
    },
}

/// Raw message delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender of the message.
    pub from: MemberId,
    /// Undecoded payload.
    pub payload: Vec<u8>,
}

/// Operations consumed from the relay/session collaborator.
///
/// Each handle represents one participant process: `local_member` is the
/// identity every write is attributed to. Only session creation and joining
/// are asynchronous; everything else must return promptly so a tick never
/// stalls.
pub trait SessionService: Send + Sync {
    /// Identity of the participant this handle acts for.
    fn local_member(&self) -> Member;
    /// Create a session owned by the local member.
    fn create_session(&self, max_members: usize) -> BoxFuture<'static, RelayResult<SessionInfo>>;
    /// Join an existing session.
    fn join_session(&self, id: SessionId) -> BoxFuture<'static, RelayResult<SessionInfo>>;
    /// Leave a session; other members get a membership notification.
    fn leave_session(&self, id: SessionId) -> RelayResult<()>;
    /// Enumerate the current members.
    fn list_members(&self, id: SessionId) -> RelayResult<Vec<Member>>;
    /// Read a shared metadata value.
    fn shared_data(&self, id: SessionId, key: &str) -> RelayResult<Option<String>>;
    /// Write a shared metadata value (last writer wins).
    fn set_shared_data(&self, id: SessionId, key: &str, value: &str) -> RelayResult<()>;
    /// Read a per-member metadata value.
    fn member_data(&self, id: SessionId, member: MemberId, key: &str)
    -> RelayResult<Option<String>>;
    /// Write a metadata value of the local member.
    fn set_member_data(&self, id: SessionId, key: &str, value: &str) -> RelayResult<()>;
    /// Overwrite another member's metadata value. Only the session owner may call this.
    fn reset_member_data(
        &self,
        id: SessionId,
        member: MemberId,
        key: &str,
        value: &str,
    ) -> RelayResult<()>;
    /// Drain the notifications queued for the local member.
    fn poll_notifications(&self, id: SessionId) -> Vec<Notification>;
    /// Send a payload to one member.
    fn send_to(&self, id: SessionId, member: MemberId, payload: &[u8]) -> RelayResult<()>;
    /// Send a payload to every other member.
    fn broadcast(&self, id: SessionId, payload: &[u8]) -> RelayResult<()>;
    /// Drain the messages queued for the local member.
    fn drain_inbound(&self, id: SessionId) -> Vec<InboundMessage>;
}
