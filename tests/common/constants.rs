#![allow(dead_code)]

/// How long to wait for a spawned test server to answer
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

pub const TEST_USER_ID: i64 = 1;
pub const OTHER_USER_ID: i64 = 2;
