//! Membership tracking with de-duplicated join/leave reporting.

use indexmap::IndexMap;
use tracing::debug;

use crate::relay::{Member, MemberId, MembershipChange};

/// Fetches a notified member may disagree with before the fetch wins.
const LAG_TOLERANCE: u32 = 8;

/// A membership transition observed by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterChange {
    /// The member is now part of the session.
    Joined(Member),
    /// The member is no longer part of the session.
    Left(Member),
}

/// Presence a notification announced, held until a fetch confirms it.
#[derive(Debug, Clone, Copy)]
struct Expected {
    present: bool,
    disagreements: u32,
}

/// Last known roster of a session.
///
/// Membership notifications are applied first, in delivery order, so a member
/// flickering in and out between two ticks is still reported twice. The
/// fetched roster then reconciles whatever the notifications missed. A member
/// settled by a notification keeps that state until a fetch agrees with it, or
/// until a bounded number of fetches in a row disagreed.
#[derive(Debug, Default, Clone)]
pub struct RosterTracker {
    members: IndexMap<MemberId, Member>,
    expected: IndexMap<MemberId, Expected>,
}

impl RosterTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Members in roster order.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Member by identity.
    pub fn get(&self, id: MemberId) -> Option<&Member> {
        self.members.get(&id)
    }

    /// Whether `id` is currently a member.
    pub fn contains(&self, id: MemberId) -> bool {
        self.members.contains_key(&id)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether nobody is tracked.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Apply one relay notification; repeated deliveries report nothing.
    pub fn apply(&mut self, member: &Member, change: MembershipChange) -> Option<RosterChange> {
        self.expected.insert(
            member.id,
            Expected {
                present: change == MembershipChange::Entered,
                disagreements: 0,
            },
        );
        match change {
            MembershipChange::Entered => {
                if self.members.contains_key(&member.id) {
                    debug!(member = %member.id, "duplicate join notification ignored");
                    return None;
                }
                self.members.insert(member.id, member.clone());
                Some(RosterChange::Joined(member.clone()))
            }
            MembershipChange::Left => match self.members.shift_remove(&member.id) {
                Some(previous) => Some(RosterChange::Left(previous)),
                None => {
                    debug!(member = %member.id, "duplicate leave notification ignored");
                    None
                }
            },
        }
    }

    /// Diff a freshly fetched roster against the snapshot and adopt it.
    ///
    /// A fetch that lags behind a notification does not undo it.
    pub fn reconcile(&mut self, fetched: Vec<Member>) -> Vec<RosterChange> {
        let mut fetched: IndexMap<MemberId, Member> =
            fetched.into_iter().map(|member| (member.id, member)).collect();
        let mut changes = Vec::new();

        let members = &self.members;
        self.expected.retain(|id, expected| {
            if fetched.contains_key(id) == expected.present {
                return false;
            }
            expected.disagreements += 1;
            if expected.disagreements > LAG_TOLERANCE {
                debug!(member = %id, present = expected.present, "fetched roster kept disagreeing; adopting it");
                return false;
            }
            if expected.present {
                if let Some(member) = members.get(id) {
                    fetched.insert(*id, member.clone());
                }
            } else {
                fetched.shift_remove(id);
            }
            true
        });

        for (id, member) in &self.members {
            if !fetched.contains_key(id) {
                changes.push(RosterChange::Left(member.clone()));
            }
        }
        for (id, member) in &fetched {
            if !self.members.contains_key(id) {
                changes.push(RosterChange::Joined(member.clone()));
            }
        }

        self.members = fetched;
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: u64, name: &str) -> Member {
        Member::new(MemberId(id), name)
    }

    #[test]
    fn duplicate_notifications_report_once() {
        let mut roster = RosterTracker::new();
        let ada = member(1, "Ada");

        assert_eq!(
            roster.apply(&ada, MembershipChange::Entered),
            Some(RosterChange::Joined(ada.clone()))
        );
        assert_eq!(roster.apply(&ada, MembershipChange::Entered), None);
        assert_eq!(
            roster.apply(&ada, MembershipChange::Left),
            Some(RosterChange::Left(ada.clone()))
        );
        assert_eq!(roster.apply(&ada, MembershipChange::Left), None);
    }

    #[test]
    fn reconcile_reports_each_transition_once() {
        let mut roster = RosterTracker::new();

        let first = roster.reconcile(vec![member(1, "Ada"), member(2, "Bob")]);
        assert_eq!(first.len(), 2);

        // Same roster again: nothing to report.
        assert!(roster.reconcile(vec![member(1, "Ada"), member(2, "Bob")]).is_empty());

        let changes = roster.reconcile(vec![member(2, "Bob"), member(3, "Cy")]);
        assert_eq!(
            changes,
            vec![
                RosterChange::Left(member(1, "Ada")),
                RosterChange::Joined(member(3, "Cy")),
            ]
        );
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn flicker_within_a_tick_reports_both_in_order() {
        let mut roster = RosterTracker::new();
        roster.reconcile(vec![member(1, "Ada")]);
        let bob = member(2, "Bob");

        let mut changes = Vec::new();
        changes.extend(roster.apply(&bob, MembershipChange::Entered));
        changes.extend(roster.apply(&bob, MembershipChange::Left));
        changes.extend(roster.reconcile(vec![member(1, "Ada")]));

        assert_eq!(
            changes,
            vec![RosterChange::Joined(bob.clone()), RosterChange::Left(bob)]
        );
    }

    #[test]
    fn lagging_fetch_does_not_undo_a_leave() {
        let mut roster = RosterTracker::new();
        roster.reconcile(vec![member(1, "Ada"), member(2, "Bob")]);
        let bob = member(2, "Bob");

        assert!(roster.apply(&bob, MembershipChange::Left).is_some());
        let changes = roster.reconcile(vec![member(1, "Ada"), bob.clone()]);

        assert!(changes.is_empty());
        assert!(!roster.contains(bob.id));
    }

    #[test]
    fn lagging_fetch_does_not_undo_a_join() {
        let mut roster = RosterTracker::new();
        roster.reconcile(vec![member(1, "Ada")]);
        let bob = member(2, "Bob");

        assert!(roster.apply(&bob, MembershipChange::Entered).is_some());
        let changes = roster.reconcile(vec![member(1, "Ada")]);

        assert!(changes.is_empty());
        assert!(roster.contains(bob.id));
    }

    #[test]
    fn leave_survives_several_lagging_fetches() {
        let mut roster = RosterTracker::new();
        roster.reconcile(vec![member(1, "Ada"), member(2, "Bob")]);
        let bob = member(2, "Bob");

        assert!(roster.apply(&bob, MembershipChange::Left).is_some());
        for _ in 0..3 {
            let changes = roster.reconcile(vec![member(1, "Ada"), bob.clone()]);
            assert!(changes.is_empty());
            assert!(!roster.contains(bob.id));
        }

        // The fetch catches up; from then on it is authoritative again.
        assert!(roster.reconcile(vec![member(1, "Ada")]).is_empty());
        assert_eq!(
            roster.reconcile(vec![member(1, "Ada"), bob.clone()]),
            vec![RosterChange::Joined(bob)]
        );
    }

    #[test]
    fn join_survives_several_lagging_fetches() {
        let mut roster = RosterTracker::new();
        roster.reconcile(vec![member(1, "Ada")]);
        let bob = member(2, "Bob");

        assert!(roster.apply(&bob, MembershipChange::Entered).is_some());
        for _ in 0..3 {
            assert!(roster.reconcile(vec![member(1, "Ada")]).is_empty());
            assert!(roster.contains(bob.id));
        }
        assert!(roster.reconcile(vec![member(1, "Ada"), bob.clone()]).is_empty());
    }

    #[test]
    fn persistent_disagreement_eventually_adopts_the_fetch() {
        let mut roster = RosterTracker::new();
        roster.reconcile(vec![member(1, "Ada")]);
        let bob = member(2, "Bob");
        roster.apply(&bob, MembershipChange::Entered);

        let mut changes = Vec::new();
        for _ in 0..=LAG_TOLERANCE {
            changes.extend(roster.reconcile(vec![member(1, "Ada")]));
        }
        assert_eq!(changes, vec![RosterChange::Left(bob.clone())]);
        assert!(!roster.contains(bob.id));
    }
}
