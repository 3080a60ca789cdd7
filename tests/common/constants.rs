//! Shared constants for end-to-end tests

/// Clock value every test pipeline starts at (epoch seconds).
pub const START_TIME: i64 = 1_700_000_000;

pub const ONE_DAY_SECS: i64 = 86_400;

pub const GROUP_ID: &str = "chat-42";

pub const COLLAPSE_ID: &str = "score";
