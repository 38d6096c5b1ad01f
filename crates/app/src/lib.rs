//! # soilgate-app
//!
//! Application layer — the gateway pipeline and its **port definitions**.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement:
//!   - `Device` — an input device that opens into a byte stream
//!   - `SubscriberEndpoint` — a listener that turns connections into sessions
//!   - `EventSink` — a non-blocking per-subscriber outbound queue
//! - Frame the device stream into lines (`line_source`)
//! - Fan measurements out to subscribers (`hub`)
//! - Own the lifecycle state machine and the ordered shutdown (`coordinator`)
//!
//! ## Dependency rule
//! Depends on `soilgate-domain` only (plus `tokio` for tasks, channels and
//! timers). Never imports adapter crates. Adapters depend on *this* crate,
//! not the reverse.

pub mod coordinator;
pub mod hub;
pub mod line_source;
pub mod ports;
pub mod shutdown;
