//! Per-process session coordinator.
//!
//! One [`SessionCoordinator`] exists per participant process. The host
//! application calls [`SessionCoordinator::tick`] from its update loop; a
//! tick drains inbound messages through the dispatcher, pumps the relay's
//! notifications, then recomputes membership, ready state, pause state and
//! the start flag in that order. Nothing here blocks or spawns tasks, and a
//! failed relay call only means "no update this tick".

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{
    SessionView, keys,
    pause::{PauseConsensus, PausePhase, PauseSnapshot, VoteOutcome},
    ready::{ReadyAggregate, ReadyEdge},
    roster::{RosterChange, RosterTracker},
    start::{CountdownPoll, GameStartSignal, StartCountdown},
};
use crate::{
    dispatch::{
        ChatMessage, DataType, Dispatcher, Envelope, PlayerUpdateMessage, ReadyMessage,
        StartGameMessage,
    },
    error::CoordinatorError,
    relay::{
        InboundMessage, Member, MemberId, MembershipChange, Notification, SessionId, SessionInfo,
        SessionService,
    },
};

/// Tunables of a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Capacity requested when creating a session.
    pub max_members: usize,
    /// Lobby countdown armed by the owner once everybody is ready.
    pub countdown: Duration,
    /// Whether the owner starts the game when the countdown expires.
    pub auto_start: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            max_members: 4,
            countdown: Duration::from_secs(5),
            auto_start: true,
        }
    }
}

/// Events raised towards gameplay and UI code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    /// A member entered the session.
    Joined {
        /// The newcomer.
        member: Member,
    },
    /// A member left or disconnected.
    Left {
        /// The departed member.
        member: Member,
    },
    /// Every member is now ready.
    AllReady,
    /// At least one member is no longer ready.
    NotAllReady,
    /// Some member's ready flag changed.
    ReadyStatusChanged {
        /// Flag per member, in roster order.
        statuses: IndexMap<MemberId, bool>,
    },
    /// The published pause state changed.
    PauseStateChanged {
        /// Whether the match is paused.
        paused: bool,
        /// Who tipped the vote into the pause.
        initiator: String,
        /// Votes for the current phase.
        votes: u32,
        /// Members counted.
        total: u32,
    },
    /// The owner started the game; raised once per process.
    GameStartSignaled,
    /// Chat line from another participant.
    ChatReceived {
        /// Transport-level sender (the owner for relayed lines).
        from: MemberId,
        /// Author's display name.
        user: String,
        /// Message text.
        message: String,
    },
    /// A peer announced its ready flag.
    PeerReady {
        /// Member concerned.
        member: MemberId,
        /// Announced flag.
        ready: bool,
    },
    /// Gameplay state of a player.
    PlayerUpdated {
        /// Transport-level sender.
        from: MemberId,
        /// Game-defined fields.
        fields: IndexMap<String, String>,
    },
    /// The lobby countdown was armed.
    CountdownStarted {
        /// Length of the countdown.
        seconds: u64,
    },
    /// Whole seconds left on the lobby countdown.
    CountdownTick {
        /// Seconds before the start.
        remaining_secs: u64,
    },
    /// The lobby countdown was disarmed.
    CountdownCancelled,
}

impl CoordinatorEvent {
    /// Stable snake_case name, identical to the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Joined { .. } => "joined",
            Self::Left { .. } => "left",
            Self::AllReady => "all_ready",
            Self::NotAllReady => "not_all_ready",
            Self::ReadyStatusChanged { .. } => "ready_status_changed",
            Self::PauseStateChanged { .. } => "pause_state_changed",
            Self::GameStartSignaled => "game_start_signaled",
            Self::ChatReceived { .. } => "chat_received",
            Self::PeerReady { .. } => "peer_ready",
            Self::PlayerUpdated { .. } => "player_updated",
            Self::CountdownStarted { .. } => "countdown_started",
            Self::CountdownTick { .. } => "countdown_tick",
            Self::CountdownCancelled => "countdown_cancelled",
        }
    }
}

impl From<RosterChange> for CoordinatorEvent {
    fn from(change: RosterChange) -> Self {
        match change {
            RosterChange::Joined(member) => Self::Joined { member },
            RosterChange::Left(member) => Self::Left { member },
        }
    }
}

impl From<PauseSnapshot> for CoordinatorEvent {
    fn from(snapshot: PauseSnapshot) -> Self {
        Self::PauseStateChanged {
            paused: snapshot.paused,
            initiator: snapshot.initiator,
            votes: snapshot.votes,
            total: snapshot.total,
        }
    }
}

/// State handed to envelope handlers while one inbound message is dispatched.
pub struct InboundContext {
    service: Arc<dyn SessionService>,
    session: SessionId,
    /// Transport-level sender of the message.
    pub from: MemberId,
    /// Session owner.
    pub owner: MemberId,
    /// Local participant.
    pub local: MemberId,
    events: Vec<CoordinatorEvent>,
    start_requested: bool,
    dirty: bool,
}

impl InboundContext {
    fn new(coordinator: &SessionCoordinator, from: MemberId) -> Self {
        Self {
            service: coordinator.service.clone(),
            session: coordinator.info.id,
            from,
            owner: coordinator.info.owner,
            local: coordinator.local.id,
            events: Vec::new(),
            start_requested: false,
            dirty: false,
        }
    }

    /// Access the session store; writes become visible to the next recompute.
    pub fn view(&self) -> SessionView<'_> {
        SessionView::new(self.service.as_ref(), self.session)
    }

    /// Raise an event from this tick.
    pub fn emit(&mut self, event: CoordinatorEvent) {
        self.events.push(event);
    }

    /// Force a recompute at the end of the tick.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

/// Coordinator of one participant in one session.
pub struct SessionCoordinator {
    service: Arc<dyn SessionService>,
    info: SessionInfo,
    local: Member,
    settings: CoordinatorSettings,
    roster: RosterTracker,
    pending_membership: VecDeque<(Member, MembershipChange)>,
    ready: ReadyAggregate,
    pause: PauseConsensus,
    start: GameStartSignal,
    countdown: StartCountdown,
    dispatcher: Dispatcher<InboundContext>,
    dirty: bool,
    active: bool,
}

impl SessionCoordinator {
    /// Create a session and coordinate it as its owner.
    pub async fn create(
        service: Arc<dyn SessionService>,
        settings: CoordinatorSettings,
    ) -> Result<Self, CoordinatorError> {
        let info = service
            .create_session(settings.max_members)
            .await
            .map_err(CoordinatorError::from_entry)?;
        let coordinator = Self::new(service, info, settings);

        let view = SessionView::new(coordinator.service.as_ref(), coordinator.info.id);
        if let Err(err) = view.set_shared(keys::OWNER_NAME, &coordinator.local.name) {
            warn!(error = %err, session = %coordinator.info.id, "failed to publish owner name");
        }
        info!(
            session = %coordinator.info.id,
            owner = %coordinator.local.id,
            max_members = coordinator.info.max_members,
            "session created"
        );
        Ok(coordinator)
    }

    /// Join an existing session.
    pub async fn join(
        service: Arc<dyn SessionService>,
        id: SessionId,
        settings: CoordinatorSettings,
    ) -> Result<Self, CoordinatorError> {
        let info = service
            .join_session(id)
            .await
            .map_err(CoordinatorError::from_entry)?;
        let coordinator = Self::new(service, info, settings);
        info!(
            session = %coordinator.info.id,
            member = %coordinator.local.id,
            owner = %coordinator.info.owner,
            "session joined"
        );
        Ok(coordinator)
    }

    fn new(
        service: Arc<dyn SessionService>,
        info: SessionInfo,
        settings: CoordinatorSettings,
    ) -> Self {
        let local = service.local_member();
        let countdown = StartCountdown::new(settings.countdown);
        let mut coordinator = Self {
            service,
            info,
            local,
            settings,
            roster: RosterTracker::new(),
            pending_membership: VecDeque::new(),
            ready: ReadyAggregate::new(),
            pause: PauseConsensus::new(),
            start: GameStartSignal::new(),
            countdown,
            dispatcher: Dispatcher::new(),
            dirty: true,
            active: true,
        };
        coordinator.register_builtin_handlers();
        coordinator
    }

    fn register_builtin_handlers(&mut self) {
        self.dispatcher
            .register(DataType::ChatMessage, |envelope, ctx| {
                match ChatMessage::try_from(envelope) {
                    Ok(chat) => ctx.emit(CoordinatorEvent::ChatReceived {
                        from: ctx.from,
                        user: chat.user,
                        message: chat.message,
                    }),
                    Err(err) => warn!(error = %err, from = %ctx.from, "dropping chat message"),
                }
            });

        self.dispatcher.register(DataType::Ready, |envelope, ctx| {
            match ReadyMessage::try_from(envelope) {
                Ok(ready) if ready.member == ctx.local => {
                    debug!(from = %ctx.from, "ignoring ready message about the local member");
                }
                Ok(ready) if ready.member != ctx.from && ctx.from != ctx.owner => {
                    warn!(
                        from = %ctx.from,
                        member = %ready.member,
                        "ignoring ready message about another member"
                    );
                }
                Ok(ready) => {
                    ctx.emit(CoordinatorEvent::PeerReady {
                        member: ready.member,
                        ready: ready.ready,
                    });
                    ctx.mark_dirty();
                }
                Err(err) => warn!(error = %err, from = %ctx.from, "dropping ready message"),
            }
        });

        self.dispatcher.register(DataType::StartGame, |_, ctx| {
            if ctx.from == ctx.owner {
                ctx.start_requested = true;
            } else {
                warn!(from = %ctx.from, "ignoring start message from a non-owner");
            }
        });

        self.dispatcher
            .register(DataType::UpdatePlayer, |envelope, ctx| {
                if let Ok(update) = PlayerUpdateMessage::try_from(envelope) {
                    ctx.emit(CoordinatorEvent::PlayerUpdated {
                        from: ctx.from,
                        fields: update.fields,
                    });
                }
            });
    }

    /// Subscribe an application handler to an envelope tag.
    ///
    /// Handlers run after the built-in ones, synchronously, inside [`tick`](Self::tick).
    pub fn on_message<F>(&mut self, data_type: DataType, handler: F)
    where
        F: FnMut(&Envelope, &mut InboundContext) + Send + 'static,
    {
        self.dispatcher.register(data_type, handler);
    }

    /// Run one update tick at the current instant.
    pub fn tick(&mut self) -> Vec<CoordinatorEvent> {
        self.tick_at(Instant::now())
    }

    /// Run one update tick; `now` drives the lobby countdown.
    pub fn tick_at(&mut self, now: Instant) -> Vec<CoordinatorEvent> {
        let mut events = Vec::new();
        if !self.active {
            return events;
        }

        self.drain_inbound(&mut events);
        self.pump_notifications();
        if self.dirty {
            self.recompute(now, &mut events);
        }
        self.drive_countdown(now, &mut events);
        events
    }

    fn drain_inbound(&mut self, events: &mut Vec<CoordinatorEvent>) {
        let mut relay_targets = None;
        for message in self.service.drain_inbound(self.info.id) {
            let envelope = match Envelope::decode(&message.payload) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(error = %err, from = %message.from, "dropping malformed envelope");
                    continue;
                }
            };

            if self.is_owner() && message.from != self.local.id {
                let targets = relay_targets.get_or_insert_with(|| self.relay_targets());
                self.relay(targets, &message, &envelope);
            }

            let mut ctx = InboundContext::new(self, message.from);
            let handled = self.dispatcher.dispatch(&envelope, &mut ctx);
            debug!(tag = %envelope.data_type(), from = %message.from, handled, "envelope dispatched");
            self.absorb(ctx, events);
        }
    }

    /// Members reachable right now. Members who joined since the last
    /// recompute are included; the tracked roster is the fallback.
    fn relay_targets(&self) -> Vec<MemberId> {
        match self.service.list_members(self.info.id) {
            Ok(members) => members.into_iter().map(|member| member.id).collect(),
            Err(err) => {
                debug!(error = %err, "relaying to the last known roster");
                self.roster.members().map(|member| member.id).collect()
            }
        }
    }

    /// Forward a non-owner's message to the other members (star topology).
    fn relay(&self, targets: &[MemberId], message: &InboundMessage, envelope: &Envelope) {
        match envelope.data_type() {
            DataType::StartGame => return,
            DataType::Ready => {
                if let Ok(ready) = ReadyMessage::try_from(envelope) {
                    if ready.member != message.from {
                        return;
                    }
                }
            }
            _ => {}
        }
        for &member in targets {
            if member == self.local.id || member == message.from {
                continue;
            }
            if let Err(err) = self.service.send_to(self.info.id, member, &message.payload) {
                warn!(error = %err, to = %member, "failed to relay message");
            }
        }
    }

    fn absorb(&mut self, ctx: InboundContext, events: &mut Vec<CoordinatorEvent>) {
        events.extend(ctx.events);
        if ctx.dirty {
            self.dirty = true;
        }
        if ctx.start_requested && self.start.observe(true) {
            self.on_game_started(events);
        }
    }

    fn pump_notifications(&mut self) {
        for notification in self.service.poll_notifications(self.info.id) {
            match notification {
                Notification::MembershipChanged { member, change } => {
                    self.pending_membership.push_back((member, change));
                }
                Notification::SharedDataChanged { .. } | Notification::MemberDataChanged { .. } => {}
            }
            self.dirty = true;
        }
    }

    /// Membership, then ready, then pause, then start. Any failure leaves the
    /// coordinator dirty so the next tick tries again.
    fn recompute(&mut self, now: Instant, events: &mut Vec<CoordinatorEvent>) {
        self.dirty = false;

        let fetched = match self.service.list_members(self.info.id) {
            Ok(members) => members,
            Err(err) => {
                let err = CoordinatorError::RosterFetchFailure(err);
                warn!(error = %err, session = %self.info.id, "skipping tick, keeping last roster");
                self.dirty = true;
                return;
            }
        };
        while let Some((member, change)) = self.pending_membership.pop_front() {
            if let Some(change) = self.roster.apply(&member, change) {
                events.push(change.into());
            }
        }
        for change in self.roster.reconcile(fetched) {
            events.push(change.into());
        }

        let is_owner = self.is_owner();
        let view = SessionView::new(self.service.as_ref(), self.info.id);

        match self.ready.recompute(view, &self.roster, self.local.id) {
            Ok(update) => {
                if let Some(statuses) = update.statuses {
                    events.push(CoordinatorEvent::ReadyStatusChanged { statuses });
                }
                match update.edge {
                    Some(ReadyEdge::AllReady) => {
                        info!(members = self.roster.len(), "all members ready");
                        events.push(CoordinatorEvent::AllReady);
                        if is_owner && !self.start.is_consumed() && self.countdown.start(now) {
                            events.push(CoordinatorEvent::CountdownStarted {
                                seconds: self.countdown.seconds(),
                            });
                        }
                    }
                    Some(ReadyEdge::NotAllReady) => {
                        info!(members = self.roster.len(), "ready check broken");
                        events.push(CoordinatorEvent::NotAllReady);
                        if self.countdown.cancel() {
                            events.push(CoordinatorEvent::CountdownCancelled);
                        }
                    }
                    None => {}
                }
            }
            Err(err) => {
                warn!(error = %err, "ready recompute failed");
                self.dirty = true;
            }
        }

        if is_owner {
            if let Err(err) = self.pause.recompute_as_owner(view, &self.roster) {
                warn!(error = %err, "pause recount failed");
                self.dirty = true;
            }
        }
        let total = u32::try_from(self.roster.len()).unwrap_or(u32::MAX);
        match self.pause.read_snapshot(view, total) {
            Ok(snapshot) => {
                if let Some(snapshot) = self.pause.observe(snapshot) {
                    info!(
                        paused = snapshot.paused,
                        initiator = %snapshot.initiator,
                        votes = snapshot.votes,
                        total = snapshot.total,
                        "pause state changed"
                    );
                    events.push(snapshot.into());
                }
            }
            Err(err) => {
                warn!(error = %err, "pause state read failed");
                self.dirty = true;
            }
        }

        match GameStartSignal::read(view) {
            Ok(flag) => {
                if self.start.observe(flag) {
                    self.on_game_started(events);
                }
            }
            Err(err) => {
                warn!(error = %err, "start flag read failed");
                self.dirty = true;
            }
        }
    }

    fn on_game_started(&mut self, events: &mut Vec<CoordinatorEvent>) {
        self.countdown.cancel();
        info!(session = %self.info.id, member = %self.local.id, "game start consumed");
        events.push(CoordinatorEvent::GameStartSignaled);
    }

    fn drive_countdown(&mut self, now: Instant, events: &mut Vec<CoordinatorEvent>) {
        match self.countdown.poll(now) {
            CountdownPoll::Idle => {}
            CountdownPoll::Tick(remaining_secs) => {
                events.push(CoordinatorEvent::CountdownTick { remaining_secs });
            }
            CountdownPoll::Expired => {
                if self.settings.auto_start && self.is_owner() {
                    if let Err(err) = self.signal_start() {
                        warn!(error = %err, "countdown expired but the start could not be signalled");
                    }
                } else {
                    debug!("countdown expired without auto start");
                }
            }
        }
    }

    fn ensure_active(&self) -> Result<(), CoordinatorError> {
        if self.active {
            Ok(())
        } else {
            Err(CoordinatorError::Inactive)
        }
    }

    fn write_local_ready(&mut self, ready: bool) -> Result<(), CoordinatorError> {
        let view = SessionView::new(self.service.as_ref(), self.info.id);
        view.set_own(keys::READY, keys::flag(ready))?;
        self.ready.set_local_override(ready);
        self.dirty = true;
        Ok(())
    }

    /// Set the local ready flag and announce it to the peers.
    pub fn set_local_ready(&mut self, ready: bool) -> Result<(), CoordinatorError> {
        self.ensure_active()?;
        self.write_local_ready(ready)?;
        let announcement = ReadyMessage {
            member: self.local.id,
            ready,
        };
        if let Err(err) = self.send(&announcement.into()) {
            warn!(error = %err, "failed to announce ready flag");
        }
        Ok(())
    }

    /// Flip the local pause/resume vote.
    pub fn toggle_vote(&mut self) -> Result<VoteOutcome, CoordinatorError> {
        self.ensure_active()?;
        let is_owner = self.is_owner();
        let view = SessionView::new(self.service.as_ref(), self.info.id);
        let outcome = self
            .pause
            .toggle_vote(view, &self.roster, &self.local, is_owner)?;
        self.dirty = true;
        Ok(outcome)
    }

    /// Vote for pausing; rejected while already paused.
    pub fn request_pause(&mut self) -> Result<VoteOutcome, CoordinatorError> {
        self.ensure_active()?;
        let is_owner = self.is_owner();
        let view = SessionView::new(self.service.as_ref(), self.info.id);
        let outcome = self
            .pause
            .request_pause(view, &self.roster, &self.local, is_owner)?;
        self.dirty = true;
        Ok(outcome)
    }

    /// Start the game for everybody. Owner only.
    pub fn signal_start(&mut self) -> Result<(), CoordinatorError> {
        self.ensure_active()?;
        let view = SessionView::new(self.service.as_ref(), self.info.id);
        self.start.signal(view, self.is_owner())?;
        if let Err(err) = self.send(&StartGameMessage.into()) {
            warn!(error = %err, "failed to announce game start");
        }
        self.dirty = true;
        Ok(())
    }

    /// Send an envelope: the owner broadcasts, the others go through the owner.
    pub fn send(&self, envelope: &Envelope) -> Result<(), CoordinatorError> {
        self.ensure_active()?;
        let bytes = envelope
            .encode()
            .map_err(|err| CoordinatorError::MalformedEnvelope(err.to_string()))?;
        if self.is_owner() {
            self.service.broadcast(self.info.id, &bytes)?;
        } else {
            self.service.send_to(self.info.id, self.info.owner, &bytes)?;
        }
        Ok(())
    }

    /// Send a chat line signed with the local display name.
    pub fn send_chat(&self, message: impl Into<String>) -> Result<(), CoordinatorError> {
        let chat = ChatMessage {
            user: self.local.name.clone(),
            message: message.into(),
        };
        self.send(&chat.into())
    }

    /// Clear the local ready and vote flags, then leave the session.
    ///
    /// Calling it again is a no-op.
    pub fn shutdown(&mut self) -> Result<(), CoordinatorError> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        self.countdown.cancel();

        let view = SessionView::new(self.service.as_ref(), self.info.id);
        for (key, value) in [(keys::READY, keys::flag(false)), (keys::VOTE, keys::vote(false))] {
            if let Err(err) = view.set_own(key, value) {
                debug!(error = %err, key, "could not clear flag before leaving");
            }
        }
        self.service.leave_session(self.info.id)?;
        info!(session = %self.info.id, member = %self.local.id, "left session");
        Ok(())
    }

    /// Whether the local participant owns the session.
    pub fn is_owner(&self) -> bool {
        self.local.id == self.info.owner
    }

    /// Whether [`shutdown`](Self::shutdown) has not run yet.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Session identifier.
    pub fn session_id(&self) -> SessionId {
        self.info.id
    }

    /// Session owner.
    pub fn owner(&self) -> MemberId {
        self.info.owner
    }

    /// Local participant.
    pub fn local_member(&self) -> &Member {
        &self.local
    }

    /// Known members in roster order.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.roster.members()
    }

    /// Display names of the known members, in roster order.
    pub fn member_names(&self) -> Vec<String> {
        self.roster.members().map(|member| member.name.clone()).collect()
    }

    /// Last evaluated ready flags.
    pub fn ready_statuses(&self) -> &IndexMap<MemberId, bool> {
        self.ready.statuses()
    }

    /// Last derived all-ready value.
    pub fn is_all_ready(&self) -> bool {
        self.ready.is_all_ready()
    }

    /// Last observed pause phase.
    pub fn phase(&self) -> PausePhase {
        self.pause.phase()
    }

    /// Last observed pause state.
    pub fn pause_snapshot(&self) -> &PauseSnapshot {
        self.pause.snapshot()
    }

    /// Whether this process already reacted to the game start.
    pub fn has_started(&self) -> bool {
        self.start.is_consumed()
    }

    /// Whether the lobby countdown is armed.
    pub fn countdown_running(&self) -> bool {
        self.countdown.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{RelayError, loopback::LoopbackHub};

    fn settings() -> CoordinatorSettings {
        CoordinatorSettings {
            max_members: 4,
            countdown: Duration::from_secs(5),
            auto_start: true,
        }
    }

    #[tokio::test]
    async fn create_publishes_owner_name_and_reports_self() {
        let hub = LoopbackHub::new();
        let mut host = SessionCoordinator::create(Arc::new(hub.connect("Ada")), settings())
            .await
            .unwrap();

        assert!(host.is_owner());
        assert_eq!(
            hub.shared_value(host.session_id(), keys::OWNER_NAME).as_deref(),
            Some("Ada")
        );

        let events = host.tick();
        assert!(events.contains(&CoordinatorEvent::Joined {
            member: host.local_member().clone()
        }));
        assert_eq!(host.member_names(), vec!["Ada".to_string()]);
        assert!(host.tick().is_empty());
    }

    #[tokio::test]
    async fn unavailable_relay_fails_creation() {
        let hub = LoopbackHub::new();
        hub.set_available(false);
        let err = SessionCoordinator::create(Arc::new(hub.connect("Ada")), settings())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CoordinatorError::ConnectionUnavailable(_)));
    }

    #[tokio::test]
    async fn joining_a_full_session_is_not_an_outage() {
        let hub = LoopbackHub::new();
        let solo = CoordinatorSettings {
            max_members: 1,
            ..settings()
        };
        let host = SessionCoordinator::create(Arc::new(hub.connect("Ada")), solo)
            .await
            .unwrap();

        let err = SessionCoordinator::join(Arc::new(hub.connect("Bob")), host.session_id(), settings())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            CoordinatorError::Relay(RelayError::SessionFull(id)) if id == host.session_id()
        ));
    }

    #[tokio::test]
    async fn joining_an_unknown_session_reports_not_found() {
        let hub = LoopbackHub::new();
        let missing = SessionId::new();

        let err = SessionCoordinator::join(Arc::new(hub.connect("Bob")), missing, settings())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            CoordinatorError::Relay(RelayError::SessionNotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn non_owner_cannot_signal_start() {
        let hub = LoopbackHub::new();
        let host = SessionCoordinator::create(Arc::new(hub.connect("Ada")), settings())
            .await
            .unwrap();
        let mut guest =
            SessionCoordinator::join(Arc::new(hub.connect("Bob")), host.session_id(), settings())
                .await
                .unwrap();

        let err = guest.signal_start().unwrap_err();
        assert!(matches!(err, CoordinatorError::NotOwner(_)));
    }

    #[tokio::test]
    async fn custom_handlers_run_after_builtin_ones() {
        let hub = LoopbackHub::new();
        let mut host = SessionCoordinator::create(Arc::new(hub.connect("Ada")), settings())
            .await
            .unwrap();
        let guest =
            SessionCoordinator::join(Arc::new(hub.connect("Bob")), host.session_id(), settings())
                .await
                .unwrap();
        host.on_message(DataType::ChatMessage, |envelope, ctx| {
            let mut fields = envelope.fields().clone();
            let owner = ctx.view().shared(keys::OWNER_NAME).ok().flatten();
            fields.insert("owner".into(), owner.unwrap_or_default());
            ctx.emit(CoordinatorEvent::PlayerUpdated {
                from: ctx.from,
                fields,
            });
        });

        guest.send_chat("hello").unwrap();
        let events = host.tick();
        let chat = events
            .iter()
            .position(|event| matches!(event, CoordinatorEvent::ChatReceived { .. }))
            .unwrap();
        let custom = events
            .iter()
            .position(|event| matches!(event, CoordinatorEvent::PlayerUpdated { .. }))
            .unwrap();
        assert!(chat < custom);
        match &events[custom] {
            CoordinatorEvent::PlayerUpdated { fields, .. } => {
                assert_eq!(fields.get("owner").map(String::as_str), Some("Ada"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let events = [
            CoordinatorEvent::AllReady,
            CoordinatorEvent::CountdownTick { remaining_secs: 2 },
            CoordinatorEvent::PauseStateChanged {
                paused: true,
                initiator: "Ada".into(),
                votes: 0,
                total: 2,
            },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.kind());
        }
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_deactivates() {
        let hub = LoopbackHub::new();
        let mut host = SessionCoordinator::create(Arc::new(hub.connect("Ada")), settings())
            .await
            .unwrap();
        host.tick();

        host.shutdown().unwrap();
        host.shutdown().unwrap();
        assert!(!host.is_active());
        assert!(!hub.session_exists(host.session_id()));
        assert!(host.tick().is_empty());
        assert!(matches!(
            host.set_local_ready(true),
            Err(CoordinatorError::Inactive)
        ));
    }
}
