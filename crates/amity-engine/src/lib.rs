//! Conversation session engine.
//!
//! A turn flows through the [`orchestrator::ChatEngine`]: persist the user's
//! line, build the [`history`] window, ask the [`completion`] service for a
//! reply, persist it, advance the [`affinity`] counter and run the [`events`]
//! detectors.

pub mod affinity;
pub mod analytics;
pub mod clock;
pub mod completion;
pub mod error;
pub mod events;
pub mod export;
pub mod history;
pub mod orchestrator;
pub mod persona;
pub mod records;
pub mod transform;
pub mod transport;

pub use error::{EngineError, EngineResult};
pub use orchestrator::{ChatEngine, EngineConfig};
