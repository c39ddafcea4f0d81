//! Edge-triggered "everyone is ready" aggregate over per-member ready flags.

use indexmap::IndexMap;

use super::{SessionView, keys, roster::RosterTracker};
use crate::relay::{MemberId, RelayResult};

/// Change of the derived all-ready condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyEdge {
    /// Not all ready -> all ready.
    AllReady,
    /// All ready -> not all ready.
    NotAllReady,
}

/// Result of one aggregate evaluation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReadyUpdate {
    /// Set only when the derived condition flipped.
    pub edge: Option<ReadyEdge>,
    /// Set only when some member's flag (or the roster) changed.
    pub statuses: Option<IndexMap<MemberId, bool>>,
}

/// Derived ready state, compared against the previous evaluation.
#[derive(Debug, Default, Clone)]
pub struct ReadyAggregate {
    all_ready: bool,
    statuses: IndexMap<MemberId, bool>,
    local_override: Option<bool>,
}

impl ReadyAggregate {
    /// Start from "not all ready" with no known flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last derived value.
    pub fn is_all_ready(&self) -> bool {
        self.all_ready
    }

    /// Last observed flag per member, in roster order.
    pub fn statuses(&self) -> &IndexMap<MemberId, bool> {
        &self.statuses
    }

    /// Remember a local write until the store reflects it.
    ///
    /// The relay may serve a stale read right after a write; the override makes
    /// the very next evaluation use the value the local member just set.
    pub fn set_local_override(&mut self, ready: bool) {
        self.local_override = Some(ready);
    }

    /// Read every member's flag from the store.
    pub fn collect(
        &mut self,
        view: SessionView<'_>,
        roster: &RosterTracker,
        local: MemberId,
    ) -> RelayResult<IndexMap<MemberId, bool>> {
        let mut statuses = IndexMap::with_capacity(roster.len());
        for member in roster.members() {
            let stored = keys::parse_flag(view.member(member.id, keys::READY)?.as_deref());
            let ready = match self.local_override {
                Some(wanted) if member.id == local => {
                    if stored == wanted {
                        self.local_override = None;
                    }
                    wanted
                }
                _ => stored,
            };
            statuses.insert(member.id, ready);
        }
        Ok(statuses)
    }

    /// Compare freshly collected flags with the previous evaluation.
    pub fn evaluate(&mut self, statuses: IndexMap<MemberId, bool>) -> ReadyUpdate {
        let all_ready = !statuses.is_empty() && statuses.values().all(|ready| *ready);
        let edge = match (self.all_ready, all_ready) {
            (false, true) => Some(ReadyEdge::AllReady),
            (true, false) => Some(ReadyEdge::NotAllReady),
            _ => None,
        };
        self.all_ready = all_ready;

        // IndexMap equality ignores order, so a reorder alone reports nothing.
        let statuses = if statuses != self.statuses {
            self.statuses = statuses.clone();
            Some(statuses)
        } else {
            None
        };

        ReadyUpdate { edge, statuses }
    }

    /// [`collect`](Self::collect) then [`evaluate`](Self::evaluate).
    pub fn recompute(
        &mut self,
        view: SessionView<'_>,
        roster: &RosterTracker,
        local: MemberId,
    ) -> RelayResult<ReadyUpdate> {
        let statuses = self.collect(view, roster, local)?;
        Ok(self.evaluate(statuses))
    }
}
