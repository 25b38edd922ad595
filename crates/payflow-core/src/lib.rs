//! Ambient plumbing shared by the payflow binaries: tracing setup, health
//! handlers, request ids, timestamp formatting, and shutdown signalling.

pub mod health;
pub mod middleware;
pub mod serde;
pub mod shutdown;
pub mod tracing;
