//! Observer API server for the Arena Relay.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/games/{id}/events`) streaming every event
//!   of one match, from the first, to a spectator
//! - **REST endpoints** for registering matches, appending events, and
//!   reading match metadata
//! - **Status endpoint** (`GET /`) with registry counts
//!
//! # Architecture
//!
//! Every handler goes through the shared
//! [`GameRegistry`](relay_core::GameRegistry). A `WebSocket` connection
//! owns one [`GameEventStream`](relay_core::GameEventStream); closing the
//! socket drops the stream, which detaches the observer from its match.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::ServerError;
pub use state::AppState;
