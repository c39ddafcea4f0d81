//! Metadata keys shared with every other client of a session, and their value encoding.

/// Shared: display name of the session owner.
pub const OWNER_NAME: &str = "ownerNameString";
/// Per-member: ready flag (`"true"`/`"false"`).
pub const READY: &str = "ready";
/// Per-member: pause or resume vote, depending on the phase (`"1"`/`"0"`).
pub const VOTE: &str = "vote";
/// Shared: bumped by voters so the owner gets a change notification.
pub const VOTE_PING: &str = "vote_ping";
/// Shared: whether the match is paused.
pub const GAME_PAUSED: &str = "game_paused";
/// Shared: who tipped the vote into the current pause.
pub const PAUSE_INITIATOR: &str = "pause_initiator";
/// Shared: pause votes while running.
pub const PAUSE_VOTE_COUNT: &str = "pause_vote_count";
/// Shared: resume votes while paused.
pub const RESUME_VOTE_COUNT: &str = "resume_vote_count";
/// Shared: one-shot start flag written by the owner.
pub const GAME_START: &str = "game_start";

/// Encode a boolean flag.
pub fn flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Encode a vote flag.
pub fn vote(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Decode a flag written by any client; absent or unparsable means `false`.
pub fn parse_flag(value: Option<&str>) -> bool {
    value.is_some_and(|raw| {
        let raw = raw.trim();
        raw == "1" || raw.eq_ignore_ascii_case("true")
    })
}

/// Decode a counter; absent or unparsable means zero.
pub fn parse_count(value: Option<&str>) -> u32 {
    value
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .unwrap_or(0)
}
