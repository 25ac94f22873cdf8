//! Filtering engine for bagslice
//!
//! This crate copies the records of selected channels within a time window
//! from one bag into another on a background worker, and reports progress
//! to a polling observer.

mod engine;
mod observer;
mod predicate;
mod progress;
mod runner;
mod state;

pub use engine::{EngineError, FilterEngine, RunJob, RunStats};
pub use observer::{DEFAULT_POLL_INTERVAL, ObserverLoop, ProgressView, RunOutcome, RunReport};
pub use predicate::WindowFilter;
pub use progress::{ProgressReceiver, ProgressSender, progress_channel};
pub use runner::{RunHandle, RunOptions, RunTrigger, StartError};
pub use state::{RunState, RunTicket};

// Re-export types used in our public API
pub use bagslice_types::{ProgressEvent, Selection, ValidationError};
