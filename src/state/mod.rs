mod sse;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::{config::AppConfig, relay::loopback::LoopbackHub, session::SessionCoordinator};

pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;
/// Coordinator of one simulated participant, locked for the duration of a tick or a call.
pub type SharedCoordinator = Arc<Mutex<SessionCoordinator>>;

const EVENTS_CAPACITY: usize = 64;

/// Central application state: the in-process relay and the participants it hosts.
pub struct AppState {
    config: AppConfig,
    relay: LoopbackHub,
    participants: DashMap<String, SharedCoordinator>,
    events: SseHub,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig) -> SharedState {
        Arc::new(Self {
            config,
            relay: LoopbackHub::new(),
            participants: DashMap::new(),
            events: SseHub::new(EVENTS_CAPACITY),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// In-process relay every participant connects through.
    pub fn relay(&self) -> &LoopbackHub {
        &self.relay
    }

    /// Broadcast hub used for the SSE stream.
    pub fn events(&self) -> &SseHub {
        &self.events
    }

    /// Register a participant under its display name.
    pub fn add_participant(&self, name: impl Into<String>, coordinator: SessionCoordinator) {
        self.participants
            .insert(name.into(), Arc::new(Mutex::new(coordinator)));
    }

    /// Look up a participant by display name.
    pub fn participant(&self, name: &str) -> Option<SharedCoordinator> {
        self.participants
            .get(name)
            .map(|entry| entry.value().clone())
    }

    /// Snapshot of every participant, sorted by name.
    ///
    /// Clones the handles so no map shard stays locked while callers await.
    pub fn participants(&self) -> Vec<(String, SharedCoordinator)> {
        let mut all: Vec<(String, SharedCoordinator)> = self
            .participants
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        all.sort_by(|(a, _), (b, _)| a.cmp(b));
        all
    }
}
