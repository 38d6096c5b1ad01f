//! Shared application state for axum handlers.

use std::sync::Arc;

use soilgate_app::hub::BroadcastHub;
use soilgate_app::ports::EndpointContext;
use soilgate_app::shutdown::SessionTracker;

use crate::config::SessionConfig;

/// Application state shared across all axum handlers.
///
/// Everything inside is reference-counted, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Hub every session subscribes to.
    pub hub: Arc<BroadcastHub>,
    /// Live session counter used by shutdown.
    pub sessions: SessionTracker,
    pub config: Arc<SessionConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(ctx: EndpointContext, config: SessionConfig) -> Self {
        Self {
            hub: ctx.hub,
            sessions: ctx.sessions,
            config: Arc::new(config),
        }
    }
}
