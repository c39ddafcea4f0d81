//! Coordination core: roster, ready check, pause/resume consensus and game start,
//! driven once per tick by [`SessionCoordinator`].

pub mod coordinator;
pub mod keys;
pub mod pause;
pub mod ready;
pub mod roster;
pub mod start;

use crate::relay::{MemberId, RelayResult, SessionId, SessionService};

pub use self::coordinator::{
    CoordinatorEvent, CoordinatorSettings, InboundContext, SessionCoordinator,
};
pub use self::pause::{PausePhase, PauseSnapshot, VoteOutcome};

/// Borrowed view of one session on the relay, shared by the components.
#[derive(Clone, Copy)]
pub struct SessionView<'a> {
    service: &'a dyn SessionService,
    id: SessionId,
}

impl<'a> SessionView<'a> {
    /// Bind a relay handle to a session.
    pub fn new(service: &'a dyn SessionService, id: SessionId) -> Self {
        Self { service, id }
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Read a shared value.
    pub fn shared(&self, key: &str) -> RelayResult<Option<String>> {
        self.service.shared_data(self.id, key)
    }

    /// Write a shared value.
    pub fn set_shared(&self, key: &str, value: &str) -> RelayResult<()> {
        self.service.set_shared_data(self.id, key, value)
    }

    /// Write a shared value unless it already holds `value`; returns whether it wrote.
    ///
    /// Every write fans out a change notification to all members, so idempotent
    /// recomputation must not rewrite unchanged keys.
    pub fn set_shared_if_changed(&self, key: &str, value: &str) -> RelayResult<bool> {
        if self.shared(key)?.as_deref() == Some(value) {
            return Ok(false);
        }
        self.set_shared(key, value)?;
        Ok(true)
    }

    /// Read another member's value.
    pub fn member(&self, member: MemberId, key: &str) -> RelayResult<Option<String>> {
        self.service.member_data(self.id, member, key)
    }

    /// Write the local member's value.
    pub fn set_own(&self, key: &str, value: &str) -> RelayResult<()> {
        self.service.set_member_data(self.id, key, value)
    }

    /// Overwrite a member's value with the owner's privilege.
    pub fn reset_member(&self, member: MemberId, key: &str, value: &str) -> RelayResult<()> {
        self.service.reset_member_data(self.id, member, key, value)
    }
}
