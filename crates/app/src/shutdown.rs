//! Shutdown primitives shared by the coordinator and the adapters.
//!
//! - [`ShutdownHandle`] — the single, idempotent entry point every trigger
//!   (signal listener, panic hook, failing component) goes through.
//! - [`StopSignal`] — tells the endpoint to stop accepting connections.
//! - [`SessionTracker`] — runs subscriber sessions as tasks so shutdown can
//!   wait for their transports to be released, or abort them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tokio::task::AbortHandle;

use soilgate_domain::lifecycle::ShutdownReason;

/// Cloneable handle used to request a gateway shutdown.
///
/// Only the first request is recorded; later ones are ignored and return
/// `false`.
#[derive(Clone)]
pub struct ShutdownHandle {
    reason: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl ShutdownHandle {
    #[must_use]
    pub fn new() -> Self {
        let (reason, _) = watch::channel(None);
        Self {
            reason: Arc::new(reason),
        }
    }

    /// Request a shutdown. Returns `true` if this call was the first one.
    pub fn request(&self, reason: ShutdownReason) -> bool {
        let description = reason.to_string();
        let mut reason = Some(reason);
        let accepted = self.reason.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = reason.take();
            true
        });
        if accepted {
            tracing::info!(reason = %description, "shutdown requested");
        } else {
            tracing::debug!(reason = %description, "shutdown already requested, ignoring");
        }
        accepted
    }

    /// The reason recorded by the first request, if any.
    #[must_use]
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.borrow().clone()
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.reason.borrow().is_some()
    }

    /// Wait until a shutdown has been requested and return its reason.
    pub async fn requested(&self) -> ShutdownReason {
        let mut rx = self.reason.subscribe();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            // The sender lives in `self`, so `changed` cannot fail here.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Fires once the coordinator wants the endpoint to stop accepting.
#[derive(Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    #[must_use]
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// Resolve when stop is signalled, or when the coordinator is gone.
    pub async fn stopped(mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Tracks live subscriber sessions.
///
/// Sessions run as their own tasks, spawned through [`spawn`](Self::spawn),
/// so shutdown can wait for them and abort the ones that outlive the grace
/// period. Aborting a session drops its transport.
#[derive(Clone)]
pub struct SessionTracker {
    live: Arc<watch::Sender<HashMap<u64, AbortHandle>>>,
    next_key: Arc<AtomicU64>,
}

impl SessionTracker {
    #[must_use]
    pub fn new() -> Self {
        let (live, _) = watch::channel(HashMap::new());
        Self {
            live: Arc::new(live),
            next_key: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `session` on its own task; it counts as live until it returns,
    /// panics or is aborted.
    pub fn spawn<F>(&self, session: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let guard = SessionGuard {
            key,
            live: Arc::clone(&self.live),
        };
        // The task removes itself on drop, which waits for this insert.
        self.live.send_modify(|live| {
            let task = tokio::spawn(async move {
                let _guard = guard;
                session.await;
            });
            live.insert(key, task.abort_handle());
        });
    }

    /// Number of sessions currently live.
    #[must_use]
    pub fn active(&self) -> usize {
        self.live.borrow().len()
    }

    /// Wait until no session is live.
    pub async fn wait_idle(&self) {
        let mut rx = self.live.subscribe();
        let _ = rx.wait_for(HashMap::is_empty).await;
    }

    /// Abort every live session and return how many there were.
    ///
    /// Sessions leave the tracker once their task has been torn down, so
    /// follow with [`wait_idle`](Self::wait_idle).
    pub fn abort_all(&self) -> usize {
        let tasks: Vec<AbortHandle> = self.live.borrow().values().cloned().collect();
        for task in &tasks {
            task.abort();
        }
        tasks.len()
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes one session from its tracker when the session task is dropped.
struct SessionGuard {
    key: u64,
    live: Arc<watch::Sender<HashMap<u64, AbortHandle>>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.live.send_modify(|live| {
            live.remove(&self.key);
        });
    }
}
