//! Domain types shared by the payment API and the queue workers.
//!
//! This crate contains only pure types with no framework dependencies.
//! The serialized forms defined here are what the record store keeps and what
//! travels through the work queue, so both binaries must agree on them.

pub mod id;
pub mod job;
pub mod payment;
