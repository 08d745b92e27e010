//! Match registry, event fan-out, and archival for the Arena Relay.
//!
//! The match engine pushes events for each running match into the
//! [`GameRegistry`]; the registry records them, fans them out to every
//! attached observer, and archives the full history to a
//! [`DurableStore`](relay_store::DurableStore) once the match ends.
//! Observers that arrive late, or after the match is archived, still see
//! every event from the first one.
//!
//! # Modules
//!
//! - [`registry`] -- [`GameRegistry`]: register, lookup, append, subscribe.
//! - [`stream`] -- [`GameEventStream`], the per-observer event sequence.
//! - [`archive`] -- Archive encoding and write retry policy.
//! - [`config`] -- Configuration loading from `relay-config.yaml`.
//! - [`error`] -- [`RelayError`].

pub mod archive;
pub mod config;
pub mod error;
pub mod registry;
mod state;
pub mod stream;

pub use archive::ArchivePolicy;
pub use config::{ConfigError, RelayConfig};
pub use error::RelayError;
pub use registry::{AppendOutcome, GameRegistry, RegistryOptions, RegistryStats};
pub use state::MatchPhase;
pub use stream::{GameEventStream, StreamEnd, StreamSource};
