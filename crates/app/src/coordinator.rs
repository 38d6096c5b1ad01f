//! Lifecycle coordinator — starts the pipeline and tears it down in order.
//!
//! Startup: open the input device, bind the subscriber endpoint, start the
//! ingest task, start serving, enter `Running`. A failure at any step
//! releases whatever was already opened and walks the state machine through
//! `ShuttingDown` to `Stopped`.
//!
//! Shutdown, once any trigger fires:
//!
//! 1. enter `ShuttingDown` and tell the endpoint to stop accepting,
//! 2. stop the ingest task, then close the input device,
//! 3. close every subscriber queue through the hub,
//! 4. wait for the endpoint and the sessions to finish,
//! 5. enter `Stopped`.
//!
//! Steps 2 to 4 share one deadline of [`CoordinatorConfig::grace_period`].
//! Sessions still live when it expires are aborted, which drops their
//! transports, before the gateway reports `Stopped`.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, timeout_at};

use soilgate_domain::error::{GatewayError, InvalidTransition};
use soilgate_domain::event::DEFAULT_GREETING;
use soilgate_domain::lifecycle::{GatewayState, ShutdownReason};
use soilgate_domain::measurement::parse_line;
use soilgate_domain::time::now;

use crate::hub::BroadcastHub;
use crate::line_source::{LineSource, LineSourceConfig};
use crate::ports::{Device, EndpointContext, SubscriberEndpoint};
use crate::shutdown::{SessionTracker, ShutdownHandle, StopSignal};

/// Coordinator tunables.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound on the whole release sequence.
    pub grace_period: Duration,
    /// Message of the acknowledgement sent to new subscribers.
    pub greeting: String,
    /// Capacity of the channel between the line source and the parser.
    pub line_buffer: usize,
    pub line: LineSourceConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(1),
            greeting: DEFAULT_GREETING.to_string(),
            line_buffer: 64,
            line: LineSourceConfig::default(),
        }
    }
}

/// Owns the lifecycle state and the shutdown trigger.
pub struct Coordinator {
    config: CoordinatorConfig,
    state: watch::Sender<GatewayState>,
    shutdown: ShutdownHandle,
}

impl Coordinator {
    #[must_use]
    pub fn new(config: CoordinatorConfig) -> Self {
        let (state, _) = watch::channel(GatewayState::Starting);
        Self {
            config,
            state,
            shutdown: ShutdownHandle::new(),
        }
    }

    /// Handle for signal listeners and panic hooks. Requests made before
    /// `start` completes are honoured as soon as the gateway runs.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    #[must_use]
    pub fn state(&self) -> GatewayState {
        *self.state.borrow()
    }

    /// Observe lifecycle transitions.
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<GatewayState> {
        self.state.subscribe()
    }

    fn transition(&self, next: GatewayState) -> Result<(), InvalidTransition> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|current| match current.advance(next) {
            Ok(state) => {
                *current = state;
                true
            }
            Err(err) => {
                outcome = Err(err);
                false
            }
        });
        if outcome.is_ok() {
            tracing::info!(state = %next, "lifecycle transition");
        }
        outcome
    }

    fn enter(&self, next: GatewayState) {
        if let Err(err) = self.transition(next) {
            tracing::warn!(%err, "ignoring lifecycle transition");
        }
    }

    fn abort_start(&self, err: &GatewayError) {
        self.shutdown
            .request(ShutdownReason::StartupFailed(error_chain(err)));
        self.enter(GatewayState::ShuttingDown);
        self.enter(GatewayState::Stopped);
    }

    /// Bring the gateway up.
    ///
    /// # Errors
    ///
    /// Returns the first startup failure, typically
    /// [`GatewayError::DeviceUnavailable`] or [`GatewayError::Bind`]. By then
    /// everything opened so far has been released and the state is
    /// `Stopped`.
    pub async fn start<D, E>(self, device: &D, mut endpoint: E) -> Result<RunningGateway, GatewayError>
    where
        D: Device,
        E: SubscriberEndpoint,
    {
        tracing::info!(device = %device.describe(), "starting gateway");
        let (line_tx, line_rx) = mpsc::channel(self.config.line_buffer.max(1));
        let (fault_tx, faults) = mpsc::channel(1);

        let mut source = match LineSource::open(device, self.config.line, line_tx, fault_tx).await
        {
            Ok(source) => source,
            Err(err) => {
                self.abort_start(&err);
                return Err(err);
            }
        };

        let local_addr = match endpoint.bind().await {
            Ok(addr) => addr,
            Err(err) => {
                tracing::error!(error = %err, "failed to bind subscriber endpoint");
                source.close().await;
                self.abort_start(&err);
                return Err(err);
            }
        };

        let hub = Arc::new(BroadcastHub::new(self.config.greeting.as_str()));
        let sessions = SessionTracker::new();
        let ingest = tokio::spawn(ingest(line_rx, Arc::clone(&hub)));

        let (stop, stop_rx) = watch::channel(false);
        let ctx = EndpointContext {
            hub: Arc::clone(&hub),
            sessions: sessions.clone(),
        };
        let serving = tokio::spawn(endpoint.serve(ctx, StopSignal::new(stop_rx)));

        self.transition(GatewayState::Running)?;
        tracing::info!(%local_addr, "gateway running");

        Ok(RunningGateway {
            coordinator: self,
            local_addr,
            hub,
            sessions,
            source,
            faults,
            ingest,
            ingest_done: false,
            serving,
            serving_done: false,
            stop,
        })
    }
}

/// A gateway in the `Running` state.
pub struct RunningGateway {
    coordinator: Coordinator,
    local_addr: SocketAddr,
    hub: Arc<BroadcastHub>,
    sessions: SessionTracker,
    source: LineSource,
    faults: mpsc::Receiver<GatewayError>,
    ingest: JoinHandle<()>,
    ingest_done: bool,
    serving: JoinHandle<Result<(), GatewayError>>,
    serving_done: bool,
    stop: watch::Sender<bool>,
}

impl RunningGateway {
    /// Address the subscriber endpoint is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Live subscriber sessions.
    #[must_use]
    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.coordinator.shutdown_handle()
    }

    #[must_use]
    pub fn state(&self) -> GatewayState {
        self.coordinator.state()
    }

    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<GatewayState> {
        self.coordinator.state_watch()
    }

    /// Run until a shutdown trigger fires, release everything, and return
    /// the reason. The state is `Stopped` when this returns.
    pub async fn wait(mut self) -> ShutdownReason {
        let trigger = self.next_trigger().await;
        self.coordinator.shutdown.request(trigger.clone());
        let reason = self.coordinator.shutdown.reason().unwrap_or(trigger);

        if reason.is_fault() {
            tracing::error!(%reason, "shutting down");
        } else {
            tracing::info!(%reason, "shutting down");
        }
        self.release().await;
        reason
    }

    async fn next_trigger(&mut self) -> ShutdownReason {
        let shutdown = self.coordinator.shutdown.clone();
        tokio::select! {
            reason = shutdown.requested() => reason,
            Some(fault) = self.faults.recv() => ShutdownReason::DeviceFault(error_chain(&fault)),
            result = &mut self.serving, if !self.serving_done => {
                self.serving_done = true;
                match result {
                    Ok(Ok(())) => ShutdownReason::EndpointFault("endpoint stopped serving".into()),
                    Ok(Err(err)) => ShutdownReason::EndpointFault(error_chain(&err)),
                    Err(err) => task_failure("endpoint", &err),
                }
            }
            result = &mut self.ingest, if !self.ingest_done => {
                self.ingest_done = true;
                // The source reports its fault before dropping the line
                // channel, so a device fault is already queued here.
                if let Ok(fault) = self.faults.try_recv() {
                    ShutdownReason::DeviceFault(error_chain(&fault))
                } else {
                    match result {
                        Ok(()) => ShutdownReason::DeviceFault("input stream ended".into()),
                        Err(err) => task_failure("ingest", &err),
                    }
                }
            }
        }
    }

    async fn release(&mut self) {
        self.coordinator.enter(GatewayState::ShuttingDown);
        let grace = self.coordinator.config.grace_period;
        let deadline = Instant::now() + grace;

        self.stop.send_replace(true);

        if !self.ingest_done {
            self.ingest.abort();
            if timeout_at(deadline, &mut self.ingest).await.is_err() {
                log_timeout("ingest", grace);
            }
            self.ingest_done = true;
        }
        if timeout_at(deadline, self.source.close()).await.is_err() {
            log_timeout("input device", grace);
        }

        let dropped = self.hub.close_all();
        tracing::debug!(dropped, "subscriber queues closed");

        if !self.serving_done {
            match timeout_at(deadline, &mut self.serving).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(err))) => tracing::warn!(%err, "endpoint failed while stopping"),
                Ok(Err(err)) => tracing::warn!(%err, "endpoint task failed while stopping"),
                Err(_) => {
                    self.serving.abort();
                    log_timeout("subscriber endpoint", grace);
                }
            }
            self.serving_done = true;
        }

        if timeout_at(deadline, self.sessions.wait_idle()).await.is_err() {
            let aborted = self.sessions.abort_all();
            tracing::warn!(aborted, "aborting subscriber sessions");
            log_timeout("subscriber sessions", grace);
            self.sessions.wait_idle().await;
        }

        self.coordinator.enter(GatewayState::Stopped);
    }
}

/// Parse every line and publish what parses.
async fn ingest(mut lines: mpsc::Receiver<String>, hub: Arc<BroadcastHub>) {
    while let Some(line) = lines.recv().await {
        let Some(measurement) = parse_line(&line, now()) else {
            tracing::debug!(%line, "unrecognized data format");
            continue;
        };
        if !measurement.is_in_sensor_range() {
            tracing::debug!(value = measurement.value(), "reading outside sensor range");
        }
        let report = hub.publish(&measurement);
        tracing::debug!(
            value = measurement.value(),
            delivered = report.delivered,
            dropped = report.dropped,
            "measurement published"
        );
    }
}

fn log_timeout(resource: &'static str, grace: Duration) {
    let err = GatewayError::ShutdownTimeout { resource, grace };
    tracing::warn!(%err, "forcing release");
}

fn task_failure(task: &str, err: &JoinError) -> ShutdownReason {
    if err.is_panic() {
        ShutdownReason::Panic(format!("{task} task panicked"))
    } else {
        ShutdownReason::EndpointFault(format!("{task} task was cancelled"))
    }
}

/// Render an error with its sources, `outer: inner: root`.
fn error_chain(err: &dyn Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
