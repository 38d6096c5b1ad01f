//! # soilgate-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Implement the [`SubscriberEndpoint`](soilgate_app::ports::SubscriberEndpoint)
//!   port: bind a TCP listener and serve until the coordinator stops it
//! - Upgrade `GET /ws` (and `GET /`) to a WebSocket and run one
//!   subscriber session per connection
//! - Serve `GET /api/health` with the live subscriber count
//!
//! ## Dependency rule
//! Depends on `soilgate-app` (ports, hub, session tracker) and
//! `soilgate-domain` (outbound events). Never leaks axum types into the core.

mod config;
mod endpoint;
pub mod router;
mod session;
pub mod state;

pub use config::SessionConfig;
pub use endpoint::AxumEndpoint;
