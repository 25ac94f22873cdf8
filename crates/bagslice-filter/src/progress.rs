//! Ordered, non-blocking delivery of progress events from a run to its observer

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

use bagslice_types::ProgressEvent;

/// Create the channel for one run
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        ProgressSender {
            sender,
            terminated: false,
        },
        ProgressReceiver { receiver },
    )
}

/// Producer half, owned by the engine
///
/// Sending never blocks. Once a terminal event has been sent every later
/// event is dropped.
#[derive(Debug)]
pub struct ProgressSender {
    sender: mpsc::UnboundedSender<ProgressEvent>,
    terminated: bool,
}

impl ProgressSender {
    /// Queue an event; returns false if it was not delivered
    pub fn send(&mut self, event: ProgressEvent) -> bool {
        if self.terminated {
            debug!(%event, "Dropping event sent after terminal event");
            return false;
        }
        self.terminated = event.is_terminal();
        self.sender.send(event).is_ok()
    }

    pub fn progress(&mut self, fraction: f64) -> bool {
        self.send(ProgressEvent::Progress(fraction))
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

/// Consumer half, owned by the observer
#[derive(Debug)]
pub struct ProgressReceiver {
    receiver: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Take every event queued so far, in order, without waiting
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        events
    }
}
