//! Server-side verification core for Apple's App Attest protocol:
//! attestation registration (bootstrapping trust in a device-generated
//! key), per-request assertion verification, and the durable device ->
//! key -> counter state machine behind both. HTTP routing and body
//! parsing live in the embedding service.

pub mod appattest;
pub mod canonical;
pub mod config;
pub mod error;
pub mod service;
pub mod store;

pub use config::Config;
pub use error::{Error, Result, VerifyError};
pub use service::{AssertionRequest, Service};
