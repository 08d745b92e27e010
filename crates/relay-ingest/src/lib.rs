//! NATS ingestion for the Arena Relay.
//!
//! The match engine announces matches and streams their events over NATS.
//! This crate subscribes, decodes, and applies them to the
//! [`GameRegistry`](relay_core::GameRegistry).
//!
//! # Modules
//!
//! - [`subject`] -- Subject layout and routing.
//! - [`dispatcher`] -- Per-match workers applying events in order.
//! - [`nats`] -- NATS connection and the ingest loop.
//! - [`error`] -- [`IngestError`].

pub mod dispatcher;
pub mod error;
pub mod nats;
pub mod subject;

pub use dispatcher::Dispatcher;
pub use error::IngestError;
pub use nats::{NatsIngest, run};
