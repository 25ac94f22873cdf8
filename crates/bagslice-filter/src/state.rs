use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct Flags {
    /// Cleared by the worker on exit or by a cancellation request
    processing: AtomicBool,
    /// Set while a worker owns the run, cancelled or not
    active: AtomicBool,
}

/// Process-wide "a run is in progress" flag
///
/// Cloning shares the flag. Clearing it while a run is active is a
/// cancellation request the engine honors before its next record. A new
/// run cannot begin until the previous worker has dropped its
/// [`RunTicket`], even after it was cancelled.
#[derive(Clone, Debug, Default)]
pub struct RunState {
    flags: Arc<Flags>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a run as started; `None` while a worker still owns the state
    pub fn begin(&self) -> Option<RunTicket> {
        self.flags
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        self.flags.processing.store(true, Ordering::SeqCst);
        Some(RunTicket {
            state: self.clone(),
        })
    }

    /// Ask the active run to stop at its next checkpoint
    pub fn cancel(&self) {
        self.flags.processing.store(false, Ordering::SeqCst);
    }

    pub fn is_processing(&self) -> bool {
        self.flags.processing.load(Ordering::SeqCst)
    }

    /// True until the worker of the last run has exited
    pub fn is_active(&self) -> bool {
        self.flags.active.load(Ordering::SeqCst)
    }

    fn release(&self) {
        self.flags.processing.store(false, Ordering::SeqCst);
        self.flags.active.store(false, Ordering::SeqCst);
    }
}

/// Ownership of the run state by one worker
///
/// Dropping the ticket clears `processing` and frees the state for the next
/// run. This also happens while unwinding from a panic.
#[derive(Debug)]
pub struct RunTicket {
    state: RunState,
}

impl RunTicket {
    /// A cancellation request arrived for this run
    pub fn is_cancelled(&self) -> bool {
        !self.state.is_processing()
    }
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        self.state.release();
    }
}
