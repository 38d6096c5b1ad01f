//! Endpoint port — the listener that accepts subscriber connections.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use soilgate_domain::error::GatewayError;

use crate::hub::BroadcastHub;
use crate::shutdown::{SessionTracker, StopSignal};

/// What a serving endpoint needs from the core.
#[derive(Clone)]
pub struct EndpointContext {
    /// Hub every session subscribes to.
    pub hub: Arc<BroadcastHub>,
    /// Sessions are spawned through this tracker, so shutdown can wait for
    /// their transports to be released or abort them.
    pub sessions: SessionTracker,
}

/// A listening endpoint that turns incoming connections into subscriber
/// sessions.
///
/// The coordinator calls [`bind`](Self::bind) during startup and then runs
/// [`serve`](Self::serve) in its own task until the stop signal fires.
pub trait SubscriberEndpoint: Send + 'static {
    /// Bind the listening socket and return the bound address.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Bind`] when the socket cannot be bound.
    fn bind(&mut self) -> impl Future<Output = Result<SocketAddr, GatewayError>> + Send;

    /// Accept subscribers until `stop` fires, then stop accepting and return.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Endpoint`] if serving fails, or
    /// [`GatewayError::Bind`] if [`bind`](Self::bind) was never called.
    fn serve(
        self,
        ctx: EndpointContext,
        stop: StopSignal,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send + 'static;
}
