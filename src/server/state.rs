use crate::background_jobs::FlushHandle;
use crate::views::ViewTracker;
use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedViewTracker = Arc<ViewTracker>;
pub type OptionalFlushHandle = Option<FlushHandle>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub view_tracker: GuardedViewTracker,
    pub flush_handle: OptionalFlushHandle,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        view_tracker: GuardedViewTracker,
        flush_handle: OptionalFlushHandle,
    ) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            view_tracker,
            flush_handle,
        }
    }
}

impl FromRef<ServerState> for GuardedViewTracker {
    fn from_ref(input: &ServerState) -> Self {
        input.view_tracker.clone()
    }
}

impl FromRef<ServerState> for OptionalFlushHandle {
    fn from_ref(input: &ServerState) -> Self {
        input.flush_handle.clone()
    }
}
