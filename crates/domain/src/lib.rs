//! # soilgate-domain
//!
//! Pure domain model for the soilgate telemetry gateway.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error taxonomy, timestamps
//! - Define the **Measurement** produced from a sensor line, and the pure
//!   line parser that recognises it
//! - Define the **outbound events** pushed to subscribers and their JSON shape
//! - Define the **gateway lifecycle** (`Starting → Running → ShuttingDown → Stopped`)
//!   and the reasons a shutdown can be requested for
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod event;
pub mod lifecycle;
pub mod measurement;
