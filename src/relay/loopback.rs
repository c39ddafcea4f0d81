//! In-process relay backing the dev harness and the test-suite.
//!
//! A [`LoopbackHub`] plays the role of the remote relay; each participant gets
//! its own [`LoopbackRelay`] handle from [`LoopbackHub::connect`]. Writes are
//! visible immediately, every write queues a change notification for all
//! members (the writer included), and broadcasts skip the sender.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use futures::{FutureExt, future::BoxFuture};
use indexmap::IndexMap;
use tracing::{debug, info};

use super::{
    InboundMessage, Member, MemberId, MembershipChange, Notification, RelayError, RelayResult,
    SessionId, SessionInfo, SessionService,
};

#[derive(Debug, Default)]
struct Mailbox {
    notifications: VecDeque<Notification>,
    inbound: VecDeque<InboundMessage>,
}

#[derive(Debug)]
struct LoopbackSession {
    owner: MemberId,
    max_members: usize,
    members: IndexMap<MemberId, Member>,
    shared: HashMap<String, String>,
    member_data: HashMap<MemberId, HashMap<String, String>>,
    mailboxes: HashMap<MemberId, Mailbox>,
}

impl LoopbackSession {
    fn info(&self, id: SessionId) -> SessionInfo {
        SessionInfo {
            id,
            owner: self.owner,
            max_members: self.max_members,
        }
    }

    fn notify_all(&mut self, notification: &Notification) {
        for mailbox in self.mailboxes.values_mut() {
            mailbox.notifications.push_back(notification.clone());
        }
    }

    fn require_member(&self, member: MemberId) -> RelayResult<()> {
        if self.members.contains_key(&member) {
            Ok(())
        } else {
            Err(RelayError::Forbidden(format!(
                "member {member} is not part of the session"
            )))
        }
    }
}

#[derive(Debug)]
struct HubInner {
    sessions: DashMap<SessionId, LoopbackSession>,
    next_member: AtomicU64,
    available: AtomicBool,
    roster_failures: AtomicU32,
}

/// Shared in-memory relay that hands out per-participant handles.
#[derive(Debug, Clone)]
pub struct LoopbackHub {
    inner: Arc<HubInner>,
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackHub {
    /// Create an empty, available hub.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                sessions: DashMap::new(),
                next_member: AtomicU64::new(1),
                available: AtomicBool::new(true),
                roster_failures: AtomicU32::new(0),
            }),
        }
    }

    /// Register a participant and return the handle acting on its behalf.
    pub fn connect(&self, name: impl Into<String>) -> LoopbackRelay {
        let id = MemberId(self.inner.next_member.fetch_add(1, Ordering::Relaxed));
        LoopbackRelay {
            hub: self.inner.clone(),
            member: Member::new(id, name),
        }
    }

    /// Toggle availability; an unavailable hub refuses to create or join sessions.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Relaxed);
    }

    /// Make the next `count` roster enumerations fail with a transport error.
    pub fn fail_roster_fetches(&self, count: u32) {
        self.inner.roster_failures.store(count, Ordering::Relaxed);
    }

    /// Queue a notification for every member again, as a flaky relay would.
    pub fn redeliver(&self, session: SessionId, notification: Notification) {
        if let Some(mut entry) = self.inner.sessions.get_mut(&session) {
            entry.notify_all(&notification);
        }
    }

    /// Read a shared value directly, bypassing any handle.
    pub fn shared_value(&self, session: SessionId, key: &str) -> Option<String> {
        self.inner
            .sessions
            .get(&session)
            .and_then(|entry| entry.shared.get(key).cloned())
    }

    /// Read a per-member value directly, bypassing any handle.
    pub fn member_value(&self, session: SessionId, member: MemberId, key: &str) -> Option<String> {
        self.inner.sessions.get(&session).and_then(|entry| {
            entry
                .member_data
                .get(&member)
                .and_then(|data| data.get(key).cloned())
        })
    }

    /// Whether the session still exists.
    pub fn session_exists(&self, session: SessionId) -> bool {
        self.inner.sessions.contains_key(&session)
    }
}

/// Participant handle on a [`LoopbackHub`].
#[derive(Debug, Clone)]
pub struct LoopbackRelay {
    hub: Arc<HubInner>,
    member: Member,
}

impl LoopbackRelay {
    fn ensure_available(&self) -> RelayResult<()> {
        if self.hub.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(RelayError::Unavailable("loopback hub is offline".into()))
        }
    }

    fn create(&self, max_members: usize) -> RelayResult<SessionInfo> {
        self.ensure_available()?;
        let id = SessionId::new();
        let mut members = IndexMap::new();
        members.insert(self.member.id, self.member.clone());
        let mut mailboxes = HashMap::new();
        mailboxes.insert(self.member.id, Mailbox::default());
        let session = LoopbackSession {
            owner: self.member.id,
            max_members: max_members.max(1),
            members,
            shared: HashMap::new(),
            member_data: HashMap::new(),
            mailboxes,
        };
        let info = session.info(id);
        self.hub.sessions.insert(id, session);
        info!(session = %id, owner = %self.member.id, "loopback session created");
        Ok(info)
    }

    fn join(&self, id: SessionId) -> RelayResult<SessionInfo> {
        self.ensure_available()?;
        let mut session = self
            .hub
            .sessions
            .get_mut(&id)
            .ok_or(RelayError::SessionNotFound(id))?;

        if session.members.contains_key(&self.member.id) {
            return Ok(session.info(id));
        }
        if session.members.len() >= session.max_members {
            return Err(RelayError::SessionFull(id));
        }

        // Existing members hear about the newcomer; the newcomer enumerates the roster.
        session.notify_all(&Notification::MembershipChanged {
            member: self.member.clone(),
            change: MembershipChange::Entered,
        });
        session.members.insert(self.member.id, self.member.clone());
        session.mailboxes.insert(self.member.id, Mailbox::default());
        info!(session = %id, member = %self.member.id, "loopback session joined");
        Ok(session.info(id))
    }

    fn with_session<T>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut LoopbackSession) -> RelayResult<T>,
    ) -> RelayResult<T> {
        let mut session = self
            .hub
            .sessions
            .get_mut(&id)
            .ok_or(RelayError::SessionNotFound(id))?;
        f(&mut session)
    }
}

impl SessionService for LoopbackRelay {
    fn local_member(&self) -> Member {
        self.member.clone()
    }

    fn create_session(&self, max_members: usize) -> BoxFuture<'static, RelayResult<SessionInfo>> {
        let result = self.create(max_members);
        async move { result }.boxed()
    }

    fn join_session(&self, id: SessionId) -> BoxFuture<'static, RelayResult<SessionInfo>> {
        let result = self.join(id);
        async move { result }.boxed()
    }

    fn leave_session(&self, id: SessionId) -> RelayResult<()> {
        let now_empty = self.with_session(id, |session| {
            let Some(member) = session.members.shift_remove(&self.member.id) else {
                return Ok(session.members.is_empty());
            };
            session.mailboxes.remove(&member.id);
            session.member_data.remove(&member.id);
            session.notify_all(&Notification::MembershipChanged {
                member,
                change: MembershipChange::Left,
            });
            Ok(session.members.is_empty())
        })?;

        if now_empty {
            self.hub.sessions.remove(&id);
            info!(session = %id, "loopback session destroyed (no members left)");
        }
        Ok(())
    }

    fn list_members(&self, id: SessionId) -> RelayResult<Vec<Member>> {
        let injected = self
            .hub
            .roster_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| {
                left.checked_sub(1)
            })
            .is_ok();
        if injected {
            debug!(session = %id, "injected roster fetch failure");
            return Err(RelayError::Transport("roster enumeration failed".into()));
        }

        self.with_session(id, |session| Ok(session.members.values().cloned().collect()))
    }

    fn shared_data(&self, id: SessionId, key: &str) -> RelayResult<Option<String>> {
        self.with_session(id, |session| Ok(session.shared.get(key).cloned()))
    }

    fn set_shared_data(&self, id: SessionId, key: &str, value: &str) -> RelayResult<()> {
        self.with_session(id, |session| {
            session.require_member(self.member.id)?;
            session.shared.insert(key.to_string(), value.to_string());
            session.notify_all(&Notification::SharedDataChanged {
                key: key.to_string(),
            });
            Ok(())
        })
    }

    fn member_data(
        &self,
        id: SessionId,
        member: MemberId,
        key: &str,
    ) -> RelayResult<Option<String>> {
        self.with_session(id, |session| {
            Ok(session
                .member_data
                .get(&member)
                .and_then(|data| data.get(key).cloned()))
        })
    }

    fn set_member_data(&self, id: SessionId, key: &str, value: &str) -> RelayResult<()> {
        self.with_session(id, |session| {
            session.require_member(self.member.id)?;
            session
                .member_data
                .entry(self.member.id)
                .or_default()
                .insert(key.to_string(), value.to_string());
            session.notify_all(&Notification::MemberDataChanged {
                member: self.member.id,
                key: key.to_string(),
            });
            Ok(())
        })
    }

    fn reset_member_data(
        &self,
        id: SessionId,
        member: MemberId,
        key: &str,
        value: &str,
    ) -> RelayResult<()> {
        self.with_session(id, |session| {
            if session.owner != self.member.id {
                return Err(RelayError::Forbidden(
                    "only the session owner may reset member data".into(),
                ));
            }
            session.require_member(member)?;
            session
                .member_data
                .entry(member)
                .or_default()
                .insert(key.to_string(), value.to_string());
            session.notify_all(&Notification::MemberDataChanged {
                member,
                key: key.to_string(),
            });
            Ok(())
        })
    }

    fn poll_notifications(&self, id: SessionId) -> Vec<Notification> {
        self.with_session(id, |session| {
            Ok(session
                .mailboxes
                .get_mut(&self.member.id)
                .map(|mailbox| mailbox.notifications.drain(..).collect())
                .unwrap_or_default())
        })
        .unwrap_or_default()
    }

    fn send_to(&self, id: SessionId, member: MemberId, payload: &[u8]) -> RelayResult<()> {
        self.with_session(id, |session| {
            let mailbox = session.mailboxes.get_mut(&member).ok_or_else(|| {
                RelayError::Transport(format!("member {member} is not reachable"))
            })?;
            mailbox.inbound.push_back(InboundMessage {
                from: self.member.id,
                payload: payload.to_vec(),
            });
            Ok(())
        })
    }

    fn broadcast(&self, id: SessionId, payload: &[u8]) -> RelayResult<()> {
        self.with_session(id, |session| {
            session.require_member(self.member.id)?;
            for (member, mailbox) in session.mailboxes.iter_mut() {
                if *member == self.member.id {
                    continue;
                }
                mailbox.inbound.push_back(InboundMessage {
                    from: self.member.id,
                    payload: payload.to_vec(),
                });
            }
            Ok(())
        })
    }

    fn drain_inbound(&self, id: SessionId) -> Vec<InboundMessage> {
        self.with_session(id, |session| {
            Ok(session
                .mailboxes
                .get_mut(&self.member.id)
                .map(|mailbox| mailbox.inbound.drain(..).collect())
                .unwrap_or_default())
        })
        .unwrap_or_default()
    }
}
