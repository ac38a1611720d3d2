//! Torrent ingestion.
//!
//! Submits a torrent paused under a unique correlation tag, waits for the
//! client to register it, classifies it by tracker and applies the resulting
//! category and upload limit before releasing it.

mod config;
mod policy;
mod runner;
mod types;
mod waiter;

pub use config::IngestConfig;
pub use policy::{PolicyApplicationError, PolicyApplier, PolicyStep};
pub use runner::Ingestor;
pub use types::*;
pub use waiter::RegistrationWaiter;
