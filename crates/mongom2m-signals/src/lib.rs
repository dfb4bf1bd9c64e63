//! # mongom2m-signals
//!
//! Signal dispatcher for mongom2m. Components announce events (such as
//! relationship changes) without knowing who listens. Each dispatch names a
//! *sender*; receivers either listen to every sender or only to one, which is
//! how observers subscribe to the changes of a single relationship.
//!
//! ## Usage
//!
//! ```
//! use mongom2m_signals::Signal;
//! use std::sync::Arc;
//!
//! struct TagAdded(&'static str);
//!
//! let signal: Signal<TagAdded> = Signal::new();
//!
//! signal.connect_to("blog.articletagrelationship", "audit", Arc::new(|event: &TagAdded| {
//!     println!("tag added: {}", event.0);
//!     None
//! }));
//!
//! let results = signal.send("blog.articletagrelationship", &TagAdded("rust"));
//! assert_eq!(results.len(), 1);
//!
//! // Other senders are not delivered to sender-scoped receivers.
//! assert!(signal.send("blog.othersender", &TagAdded("go")).is_empty());
//! ```

use std::any::Any;
use std::sync::{Arc, RwLock};

/// The type signature for a signal receiver callback.
///
/// Receivers accept a reference to the signal payload and may optionally
/// return a boxed value.
pub type SignalReceiver<T> = Arc<dyn Fn(&T) -> Option<Box<dyn Any + Send>> + Send + Sync>;

struct Receiver<T> {
    id: String,
    sender: Option<String>,
    callback: SignalReceiver<T>,
}

impl<T> Receiver<T> {
    fn accepts(&self, sender: &str) -> bool {
        self.sender.as_deref().map_or(true, |s| s == sender)
    }
}

/// A signal that can be connected to and dispatched.
///
/// Receivers are called in the order they were connected.
pub struct Signal<T: 'static> {
    receivers: RwLock<Vec<Receiver<T>>>,
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Signal<T> {
    /// Creates a new signal with no connected receivers.
    pub const fn new() -> Self {
        Self {
            receivers: RwLock::new(Vec::new()),
        }
    }

    /// Connects a receiver that is called for every sender.
    ///
    /// If a receiver with the same ID is already connected, it is replaced.
    pub fn connect(&self, receiver_id: impl Into<String>, callback: SignalReceiver<T>) {
        self.insert(receiver_id.into(), None, callback);
    }

    /// Connects a receiver that is only called for dispatches from `sender`.
    pub fn connect_to(
        &self,
        sender: impl Into<String>,
        receiver_id: impl Into<String>,
        callback: SignalReceiver<T>,
    ) {
        self.insert(receiver_id.into(), Some(sender.into()), callback);
    }

    fn insert(&self, id: String, sender: Option<String>, callback: SignalReceiver<T>) {
        let mut receivers = self.receivers.write().expect("signal lock poisoned");
        let receiver = Receiver {
            id,
            sender,
            callback,
        };
        if let Some(entry) = receivers.iter_mut().find(|r| r.id == receiver.id) {
            *entry = receiver;
        } else {
            receivers.push(receiver);
        }
    }

    /// Disconnects the receiver with the given ID.
    ///
    /// Returns `true` if a receiver was found and removed.
    pub fn disconnect(&self, receiver_id: &str) -> bool {
        let mut receivers = self.receivers.write().expect("signal lock poisoned");
        let len_before = receivers.len();
        receivers.retain(|r| r.id != receiver_id);
        receivers.len() < len_before
    }

    /// Sends the signal on behalf of `sender`.
    ///
    /// Returns the values returned by every receiver that accepted the sender.
    /// The receiver list is snapshotted before dispatch, so a receiver may
    /// connect or disconnect others without deadlocking.
    pub fn send(&self, sender: &str, payload: &T) -> Vec<Option<Box<dyn Any + Send>>> {
        let callbacks: Vec<SignalReceiver<T>> = {
            let receivers = self.receivers.read().expect("signal lock poisoned");
            receivers
                .iter()
                .filter(|r| r.accepts(sender))
                .map(|r| Arc::clone(&r.callback))
                .collect()
        };
        tracing::trace!(sender, receivers = callbacks.len(), "dispatching signal");
        callbacks.iter().map(|callback| callback(payload)).collect()
    }

    /// Returns `true` if any receiver would be called for `sender`.
    pub fn has_listeners(&self, sender: &str) -> bool {
        self.receivers
            .read()
            .expect("signal lock poisoned")
            .iter()
            .any(|r| r.accepts(sender))
    }

    /// Returns the number of connected receivers.
    pub fn receiver_count(&self) -> usize {
        self.receivers.read().expect("signal lock poisoned").len()
    }
}
