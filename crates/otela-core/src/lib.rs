//! Shared configuration and observability plumbing for the Otela gateway.

pub mod config;
pub mod events;

pub use config::{ConfigError, OtelaConfig};
pub use events::{EventSink, ForwardEvent};
