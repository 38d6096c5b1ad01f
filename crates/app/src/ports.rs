//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the gateway core and the outside world.
//! They are defined here (in `app`) so that both the coordinator and the
//! adapter crates can depend on them without creating circular dependencies.

pub mod device;
pub mod endpoint;
pub mod sink;

pub use device::Device;
pub use endpoint::{EndpointContext, SubscriberEndpoint};
pub use sink::{EventSink, QueueSink};
