//! Lobby coordinator: envelope dispatch, membership tracking, ready aggregation,
//! pause/resume majority voting and a one-shot game start on top of a relay
//! session service, plus the HTTP harness hosting simulated participants.

pub mod config;
pub mod dispatch;
pub mod dto;
pub mod error;
pub mod relay;
pub mod routes;
pub mod services;
pub mod session;
pub mod state;
