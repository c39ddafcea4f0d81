//! Majority-vote pause/resume state machine.
//!
//! Every member toggles its own `vote` flag. Only the owner counts the votes,
//! flips the phase on a strict majority and wipes all flags afterwards, because
//! the shared store offers no compare-and-swap. Every member (the owner
//! included) then observes the published state and reports a change only when
//! `(paused, initiator, votes, total)` differs from what it last saw.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{SessionView, keys, roster::RosterTracker};
use crate::{
    error::CoordinatorError,
    relay::{Member, MemberId, RelayResult},
};

/// Phase of the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PausePhase {
    /// Playing; votes count toward pausing.
    #[default]
    Running,
    /// Paused; votes count toward resuming.
    Paused,
}

impl PausePhase {
    fn from_flag(paused: bool) -> Self {
        if paused { Self::Paused } else { Self::Running }
    }

    /// Whether the match is paused.
    pub fn is_paused(self) -> bool {
        self == Self::Paused
    }

    /// Phase a successful vote leads to.
    pub fn flipped(self) -> Self {
        match self {
            Self::Running => Self::Paused,
            Self::Paused => Self::Running,
        }
    }

    /// Shared counter holding the votes of this phase.
    pub fn counter_key(self) -> &'static str {
        match self {
            Self::Running => keys::PAUSE_VOTE_COUNT,
            Self::Paused => keys::RESUME_VOTE_COUNT,
        }
    }
}

/// Published pause state as seen by one member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PauseSnapshot {
    /// Whether the match is paused.
    pub paused: bool,
    /// Who tipped the vote into the current pause; empty while running.
    pub initiator: String,
    /// Votes for the current phase.
    pub votes: u32,
    /// Members counted.
    pub total: u32,
}

impl PauseSnapshot {
    /// Phase described by the snapshot.
    pub fn phase(&self) -> PausePhase {
        PausePhase::from_flag(self.paused)
    }
}

/// Result of a local vote action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VoteOutcome {
    /// The local flag now holds `vote`; the owner counts it on its next tick.
    Cast {
        /// Phase the vote was cast in.
        phase: PausePhase,
        /// New value of the local flag.
        vote: bool,
    },
    /// Sole member: paused without a recount.
    PausedImmediately,
    /// A pause was requested while already paused.
    Rejected,
}

/// `votes > total / 2` with integer division.
pub fn strict_majority(votes: u32, total: u32) -> bool {
    votes > total / 2
}

/// Votes counted over the current roster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteTally {
    /// Members whose flag is set.
    pub votes: u32,
    /// Members counted.
    pub total: u32,
    /// First voting member in roster order.
    pub first_voter: Option<Member>,
}

impl VoteTally {
    /// Count the `vote` flags of every current member.
    pub fn count(view: SessionView<'_>, roster: &RosterTracker) -> RelayResult<Self> {
        let mut tally = Self::default();
        for member in roster.members() {
            tally.total += 1;
            if keys::parse_flag(view.member(member.id, keys::VOTE)?.as_deref()) {
                tally.votes += 1;
                if tally.first_voter.is_none() {
                    tally.first_voter = Some(member.clone());
                }
            }
        }
        Ok(tally)
    }
}

/// Per-process view of the pause protocol.
#[derive(Debug, Default)]
pub struct PauseConsensus {
    last_seen: PauseSnapshot,
    ping_counter: u64,
}

impl PauseConsensus {
    /// Start in the running phase with nothing observed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last observed snapshot.
    pub fn snapshot(&self) -> &PauseSnapshot {
        &self.last_seen
    }

    /// Last observed phase.
    pub fn phase(&self) -> PausePhase {
        self.last_seen.phase()
    }

    /// Authoritative recount, run by the owner on every relevant change.
    ///
    /// Returns the phase entered when the tally reached a strict majority.
    pub fn recompute_as_owner(
        &mut self,
        view: SessionView<'_>,
        roster: &RosterTracker,
    ) -> Result<Option<PausePhase>, CoordinatorError> {
        let phase = read_phase(view)?;
        let tally = VoteTally::count(view, roster)?;

        if strict_majority(tally.votes, tally.total) {
            let target = phase.flipped();
            let initiator = match target {
                PausePhase::Paused => tally.first_voter.map(|member| member.name).unwrap_or_default(),
                PausePhase::Running => String::new(),
            };
            apply_transition(view, roster, target, &initiator)?;
            info!(
                votes = tally.votes,
                total = tally.total,
                phase = ?target,
                initiator = %initiator,
                "vote reached a strict majority"
            );
            return Ok(Some(target));
        }

        let counter = phase.counter_key();
        let stored = keys::parse_count(view.shared(counter)?.as_deref());
        if stored > tally.total {
            let err = CoordinatorError::InvariantViolation(format!(
                "`{counter}` holds {stored} votes for {} members",
                tally.total
            ));
            warn!(error = %err, "overwriting stale vote counter with a fresh recount");
        }
        if view.set_shared_if_changed(counter, &tally.votes.to_string())? {
            debug!(counter, votes = tally.votes, total = tally.total, "vote tally published");
        }
        Ok(None)
    }

    /// Flip the local vote flag.
    pub fn toggle_vote(
        &mut self,
        view: SessionView<'_>,
        roster: &RosterTracker,
        local: &Member,
        is_owner: bool,
    ) -> Result<VoteOutcome, CoordinatorError> {
        let current = keys::parse_flag(view.member(local.id, keys::VOTE)?.as_deref());
        self.cast(view, roster, local, is_owner, !current)
    }

    /// Vote for pausing; rejected while already paused.
    pub fn request_pause(
        &mut self,
        view: SessionView<'_>,
        roster: &RosterTracker,
        local: &Member,
        is_owner: bool,
    ) -> Result<VoteOutcome, CoordinatorError> {
        if read_phase(view)?.is_paused() {
            info!(member = %local.id, "pause requested while already paused; ignored");
            return Ok(VoteOutcome::Rejected);
        }
        self.cast(view, roster, local, is_owner, true)
    }

    fn cast(
        &mut self,
        view: SessionView<'_>,
        roster: &RosterTracker,
        local: &Member,
        is_owner: bool,
        vote: bool,
    ) -> Result<VoteOutcome, CoordinatorError> {
        let phase = read_phase(view)?;

        if vote && is_owner && phase == PausePhase::Running && roster.len() == 1 {
            apply_transition(view, roster, PausePhase::Paused, &local.name)?;
            info!(member = %local.id, "sole member paused the match");
            return Ok(VoteOutcome::PausedImmediately);
        }

        view.set_own(keys::VOTE, keys::vote(vote))?;
        if !is_owner {
            self.ping(view, local.id)?;
        }
        debug!(member = %local.id, phase = ?phase, vote, "vote cast");
        Ok(VoteOutcome::Cast { phase, vote })
    }

    /// Bump the shared ping so the owner hears about a per-member write.
    fn ping(&mut self, view: SessionView<'_>, local: MemberId) -> RelayResult<()> {
        self.ping_counter += 1;
        view.set_shared(keys::VOTE_PING, &format!("{local}:{}", self.ping_counter))
    }

    /// Read the published state, clamped to the invariants.
    pub fn read_snapshot(&self, view: SessionView<'_>, total: u32) -> RelayResult<PauseSnapshot> {
        let paused = keys::parse_flag(view.shared(keys::GAME_PAUSED)?.as_deref());
        let phase = PausePhase::from_flag(paused);

        let mut votes = keys::parse_count(view.shared(phase.counter_key())?.as_deref());
        if votes > total {
            let err = CoordinatorError::InvariantViolation(format!(
                "{votes} votes reported for {total} members"
            ));
            warn!(error = %err, "clamping stale vote count");
            votes = total;
        }

        let mut initiator = view.shared(keys::PAUSE_INITIATOR)?.unwrap_or_default();
        if !paused && !initiator.is_empty() {
            debug!(initiator = %initiator, "ignoring initiator left over while running");
            initiator.clear();
        }

        Ok(PauseSnapshot {
            paused,
            initiator,
            votes,
            total,
        })
    }

    /// Record `snapshot`; returns it when it differs from the last one seen.
    pub fn observe(&mut self, snapshot: PauseSnapshot) -> Option<PauseSnapshot> {
        if snapshot == self.last_seen {
            return None;
        }
        self.last_seen = snapshot.clone();
        Some(snapshot)
    }
}

fn read_phase(view: SessionView<'_>) -> RelayResult<PausePhase> {
    let paused = keys::parse_flag(view.shared(keys::GAME_PAUSED)?.as_deref());
    Ok(PausePhase::from_flag(paused))
}

/// Enter `target`: wipe every vote, reset both counters, then publish the phase.
fn apply_transition(
    view: SessionView<'_>,
    roster: &RosterTracker,
    target: PausePhase,
    initiator: &str,
) -> RelayResult<()> {
    for member in roster.members() {
        if keys::parse_flag(view.member(member.id, keys::VOTE)?.as_deref()) {
            view.reset_member(member.id, keys::VOTE, keys::vote(false))?;
        }
    }
    view.set_shared_if_changed(keys::PAUSE_VOTE_COUNT, "0")?;
    view.set_shared_if_changed(keys::RESUME_VOTE_COUNT, "0")?;
    view.set_shared_if_changed(keys::PAUSE_INITIATOR, initiator)?;
    view.set_shared_if_changed(keys::GAME_PAUSED, keys::flag(target.is_paused()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{
        SessionId, SessionService,
        loopback::{LoopbackHub, LoopbackRelay},
    };

    #[test]
    fn strict_majority_uses_integer_division() {
        assert!(!strict_majority(0, 1));
        assert!(strict_majority(1, 1));
        assert!(!strict_majority(1, 2));
        assert!(strict_majority(2, 2));
        assert!(!strict_majority(1, 3));
        assert!(strict_majority(2, 3));
        assert!(!strict_majority(2, 4));
        assert!(strict_majority(3, 4));
    }

    struct Lobby {
        hub: LoopbackHub,
        session: SessionId,
        relays: Vec<LoopbackRelay>,
        roster: RosterTracker,
    }

    impl Lobby {
        async fn with_members(names: &[&str]) -> Self {
            let hub = LoopbackHub::new();
            let relays: Vec<LoopbackRelay> = names.iter().map(|name| hub.connect(*name)).collect();
            let session = relays[0].create_session(names.len()).await.unwrap().id;
            for relay in &relays[1..] {
                relay.join_session(session).await.unwrap();
            }
            let mut roster = RosterTracker::new();
            roster.reconcile(relays[0].list_members(session).unwrap());
            Self {
                hub,
                session,
                relays,
                roster,
            }
        }

        fn view(&self, index: usize) -> SessionView<'_> {
            SessionView::new(&self.relays[index], self.session)
        }

        fn vote(&self, index: usize) {
            self.relays[index]
                .set_member_data(self.session, keys::VOTE, keys::vote(true))
                .unwrap();
        }

        fn shared(&self, key: &str) -> Option<String> {
            self.hub.shared_value(self.session, key)
        }

        fn vote_flag(&self, index: usize) -> Option<String> {
            let member = self.relays[index].local_member().id;
            self.hub.member_value(self.session, member, keys::VOTE)
        }
    }

    #[tokio::test]
    async fn four_members_need_three_votes() {
        let lobby = Lobby::with_members(&["Ada", "Bob", "Cy", "Dee"]).await;
        let mut owner = PauseConsensus::new();

        lobby.vote(1);
        lobby.vote(2);
        assert_eq!(owner.recompute_as_owner(lobby.view(0), &lobby.roster).unwrap(), None);
        assert_eq!(lobby.shared(keys::PAUSE_VOTE_COUNT).as_deref(), Some("2"));

        lobby.vote(3);
        assert_eq!(
            owner.recompute_as_owner(lobby.view(0), &lobby.roster).unwrap(),
            Some(PausePhase::Paused)
        );
        assert_eq!(lobby.shared(keys::GAME_PAUSED).as_deref(), Some("true"));
        assert_eq!(lobby.shared(keys::PAUSE_INITIATOR).as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn transition_clears_all_flags_and_counters() {
        let lobby = Lobby::with_members(&["Ada", "Bob", "Cy"]).await;
        let mut owner = PauseConsensus::new();

        lobby.vote(0);
        lobby.vote(2);
        owner.recompute_as_owner(lobby.view(0), &lobby.roster).unwrap();

        for index in 0..3 {
            assert_ne!(lobby.vote_flag(index).as_deref(), Some("1"));
        }
        assert_eq!(lobby.shared(keys::PAUSE_VOTE_COUNT).as_deref(), Some("0"));
        assert_eq!(lobby.shared(keys::RESUME_VOTE_COUNT).as_deref(), Some("0"));

        // Same votes now count toward resuming.
        lobby.vote(1);
        lobby.vote(2);
        assert_eq!(
            owner.recompute_as_owner(lobby.view(0), &lobby.roster).unwrap(),
            Some(PausePhase::Running)
        );
        assert_eq!(lobby.shared(keys::GAME_PAUSED).as_deref(), Some("false"));
        assert_eq!(lobby.shared(keys::PAUSE_INITIATOR).as_deref(), Some(""));
        for index in 0..3 {
            assert_ne!(lobby.vote_flag(index).as_deref(), Some("1"));
        }
    }

    #[tokio::test]
    async fn sole_member_pauses_immediately() {
        let lobby = Lobby::with_members(&["Ada"]).await;
        let mut consensus = PauseConsensus::new();
        let ada = lobby.relays[0].local_member();

        let outcome = consensus
            .toggle_vote(lobby.view(0), &lobby.roster, &ada, true)
            .unwrap();
        assert_eq!(outcome, VoteOutcome::PausedImmediately);
        assert_eq!(lobby.shared(keys::GAME_PAUSED).as_deref(), Some("true"));
        assert_eq!(lobby.shared(keys::PAUSE_INITIATOR).as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn pause_request_while_paused_is_rejected() {
        let lobby = Lobby::with_members(&["Ada", "Bob"]).await;
        let mut consensus = PauseConsensus::new();
        let bob = lobby.relays[1].local_member();
        lobby.relays[0]
            .set_shared_data(lobby.session, keys::GAME_PAUSED, "true")
            .unwrap();
        lobby.relays[0]
            .set_shared_data(lobby.session, keys::PAUSE_INITIATOR, "Ada")
            .unwrap();

        let outcome = consensus
            .request_pause(lobby.view(1), &lobby.roster, &bob, false)
            .unwrap();
        assert_eq!(outcome, VoteOutcome::Rejected);
        assert_eq!(lobby.vote_flag(1), None);
        assert_eq!(lobby.shared(keys::PAUSE_INITIATOR).as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn non_owner_vote_pings_the_owner() {
        let lobby = Lobby::with_members(&["Ada", "Bob"]).await;
        let mut consensus = PauseConsensus::new();
        let bob = lobby.relays[1].local_member();

        let outcome = consensus
            .toggle_vote(lobby.view(1), &lobby.roster, &bob, false)
            .unwrap();
        assert_eq!(
            outcome,
            VoteOutcome::Cast {
                phase: PausePhase::Running,
                vote: true
            }
        );
        assert_eq!(lobby.vote_flag(1).as_deref(), Some("1"));
        assert_eq!(
            lobby.shared(keys::VOTE_PING),
            Some(format!("{}:1", bob.id))
        );

        let outcome = consensus
            .toggle_vote(lobby.view(1), &lobby.roster, &bob, false)
            .unwrap();
        assert_eq!(
            outcome,
            VoteOutcome::Cast {
                phase: PausePhase::Running,
                vote: false
            }
        );
    }

    #[tokio::test]
    async fn snapshot_is_clamped_and_deduplicated() {
        let lobby = Lobby::with_members(&["Ada", "Bob"]).await;
        let mut consensus = PauseConsensus::new();
        lobby.relays[0]
            .set_shared_data(lobby.session, keys::PAUSE_VOTE_COUNT, "7")
            .unwrap();

        let snapshot = consensus.read_snapshot(lobby.view(1), 2).unwrap();
        assert_eq!(snapshot.votes, 2);
        assert!(consensus.observe(snapshot.clone()).is_some());
        assert!(consensus.observe(snapshot).is_none());

        // The owner's recount repairs the stored value.
        let mut owner = PauseConsensus::new();
        owner.recompute_as_owner(lobby.view(0), &lobby.roster).unwrap();
        assert_eq!(lobby.shared(keys::PAUSE_VOTE_COUNT).as_deref(), Some("0"));
    }
}
