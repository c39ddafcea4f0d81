use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::{services::sse_events, state::SharedState};

/// Drive every hosted coordinator at the configured tick interval, forever.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        tick_all(&state).await;
    }
}

/// Tick each participant once and publish what it observed; returns the number of events.
pub async fn tick_all(state: &SharedState) -> usize {
    let mut produced = 0;
    for (name, coordinator) in state.participants() {
        let events = coordinator.lock().await.tick();
        if events.is_empty() {
            continue;
        }
        for event in &events {
            debug!(participant = %name, event = event.kind(), "coordinator event");
        }
        produced += events.len();
        sse_events::broadcast_coordinator_events(state, &name, &events);
    }
    produced
}
