//! One-shot game start: the owner's shared flag, a per-process latch, and the
//! lobby countdown that precedes it.

use std::time::{Duration, Instant};

use tracing::info;

use super::{SessionView, keys};
use crate::{error::CoordinatorError, relay::RelayResult};

/// Local consumption latch for the shared `game_start` flag.
#[derive(Debug, Default)]
pub struct GameStartSignal {
    consumed: bool,
}

impl GameStartSignal {
    /// Create an unconsumed latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the start flag. Only the owner may do this.
    pub fn signal(&self, view: SessionView<'_>, is_owner: bool) -> Result<(), CoordinatorError> {
        if !is_owner {
            return Err(CoordinatorError::NotOwner("signal the game start"));
        }
        if view.set_shared_if_changed(keys::GAME_START, keys::flag(true))? {
            info!(session = %view.id(), "game start signalled");
        }
        Ok(())
    }

    /// Current value of the shared flag.
    pub fn read(view: SessionView<'_>) -> RelayResult<bool> {
        Ok(keys::parse_flag(view.shared(keys::GAME_START)?.as_deref()))
    }

    /// Feed an observed flag value; `true` exactly once, on the first set flag.
    pub fn observe(&mut self, flag: bool) -> bool {
        if !flag || self.consumed {
            return false;
        }
        self.consumed = true;
        true
    }

    /// Whether this process already reacted to the start.
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }
}

/// What a countdown poll produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownPoll {
    /// Not running, or nothing new to announce.
    Idle,
    /// Whole seconds left changed.
    Tick(u64),
    /// Deadline reached; the countdown stopped.
    Expired,
}

/// Lobby countdown armed when everybody is ready.
#[derive(Debug, Clone)]
pub struct StartCountdown {
    duration: Duration,
    deadline: Option<Instant>,
    last_announced: Option<u64>,
}

impl StartCountdown {
    /// Create an idle countdown of `duration`.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadline: None,
            last_announced: None,
        }
    }

    /// Configured length in whole seconds, rounded up.
    pub fn seconds(&self) -> u64 {
        ceil_secs(self.duration)
    }

    /// Whether a deadline is armed.
    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Arm the countdown; `false` when it was already running.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.duration);
        self.last_announced = Some(self.seconds());
        true
    }

    /// Disarm the countdown; `false` when it was not running.
    pub fn cancel(&mut self) -> bool {
        self.last_announced = None;
        self.deadline.take().is_some()
    }

    /// Advance to `now`.
    pub fn poll(&mut self, now: Instant) -> CountdownPoll {
        let Some(deadline) = self.deadline else {
            return CountdownPoll::Idle;
        };
        if now >= deadline {
            self.cancel();
            return CountdownPoll::Expired;
        }

        let remaining = ceil_secs(deadline - now);
        if self.last_announced == Some(remaining) {
            return CountdownPoll::Idle;
        }
        self.last_announced = Some(remaining);
        CountdownPoll::Tick(remaining)
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{SessionService, loopback::LoopbackHub};

    #[test]
    fn latch_fires_once() {
        let mut signal = GameStartSignal::new();
        assert!(!signal.observe(false));
        assert!(signal.observe(true));
        assert!(!signal.observe(true));
        assert!(!signal.observe(true));
        assert!(signal.is_consumed());
    }

    #[tokio::test]
    async fn only_owner_signals() {
        let hub = LoopbackHub::new();
        let ada = hub.connect("Ada");
        let bob = hub.connect("Bob");
        let session = ada.create_session(2).await.unwrap().id;
        bob.join_session(session).await.unwrap();
        let signal = GameStartSignal::new();

        let err = signal
            .signal(SessionView::new(&bob, session), false)
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::NotOwner(_)));
        assert!(!GameStartSignal::read(SessionView::new(&bob, session)).unwrap());

        signal.signal(SessionView::new(&ada, session), true).unwrap();
        assert!(GameStartSignal::read(SessionView::new(&bob, session)).unwrap());
    }

    #[test]
    fn countdown_announces_each_second_then_expires() {
        let start = Instant::now();
        let mut countdown = StartCountdown::new(Duration::from_secs(3));

        assert!(countdown.start(start));
        assert!(!countdown.start(start + Duration::from_millis(10)));
        assert_eq!(countdown.poll(start), CountdownPoll::Idle);
        assert_eq!(
            countdown.poll(start + Duration::from_millis(1100)),
            CountdownPoll::Tick(2)
        );
        assert_eq!(
            countdown.poll(start + Duration::from_millis(1500)),
            CountdownPoll::Idle
        );
        assert_eq!(
            countdown.poll(start + Duration::from_millis(2100)),
            CountdownPoll::Tick(1)
        );
        assert_eq!(
            countdown.poll(start + Duration::from_secs(3)),
            CountdownPoll::Expired
        );
        assert!(!countdown.is_running());
        assert_eq!(
            countdown.poll(start + Duration::from_secs(4)),
            CountdownPoll::Idle
        );
    }

    #[test]
    fn cancelled_countdown_never_expires() {
        let start = Instant::now();
        let mut countdown = StartCountdown::new(Duration::from_secs(5));
        countdown.start(start);

        assert!(countdown.cancel());
        assert!(!countdown.cancel());
        assert_eq!(
            countdown.poll(start + Duration::from_secs(10)),
            CountdownPoll::Idle
        );
    }
}
