use std::sync::mpsc::{self, Receiver, Sender};

use parking_lot::Mutex;
use serde::Serialize;

/// How a subscriber should apply an event to its view of the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// The event object is the new value of the subject.
    Replace,
    /// The subject changed; the new value must be fetched.
    Reload,
}

/// A notification about a changed subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub subject: String,
    pub action: Action,
    pub object: serde_json::Value,
}

/// Registry of event subscribers.
///
/// Each subscriber owns an unbounded channel receiver, so notifying never
/// blocks the producer. Subscribers that dropped their receiver are pruned
/// on the next notification.
#[derive(Default)]
pub struct Observers {
    senders: Mutex<Vec<Sender<Event>>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = mpsc::channel();
        self.senders.lock().push(tx);
        rx
    }

    pub fn notify(&self, event: Event) {
        self.senders.lock().retain(|s| s.send(event.clone()).is_ok());
    }
}
