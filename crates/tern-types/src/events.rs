//! Change notifications for whatever presents tern content.
//!
//! Every notification is its own struct implementing [`Event`]. Subscribers
//! pick the types they care about with [`EventBus::subscribe`]; each type
//! gets its own `tokio::sync::broadcast` channel on first subscription, so a
//! slow status display never delays post notifications.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::warn;

use crate::{Edition, IdentityId, IdentityStatus, Post, Reply};

// ---------------------------------------------------------------------------
// Event trait
// ---------------------------------------------------------------------------

/// Marker trait for all events that can travel through the [`EventBus`].
pub trait Event: Any + Send + Sync + Clone + std::fmt::Debug + 'static {}

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// What caused an identity's document to change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOrigin {
    /// A newer edition was found by the refresh loop.
    Refresh,
    /// An older edition was adopted by a rescue.
    Rescue,
    /// A local identity changed its own document.
    Local,
}

/// An identity's current document has been replaced.
#[derive(Clone, Debug)]
pub struct IdentityUpdated {
    pub identity: IdentityId,
    /// Edition of the document now current.
    pub edition: Edition,
    pub origin: UpdateOrigin,
}
impl Event for IdentityUpdated {}

/// A post appeared that was not present in the previous document.
#[derive(Clone, Debug)]
pub struct PostFound {
    pub post: Post,
}
impl Event for PostFound {}

/// A post disappeared from its owner's document.
#[derive(Clone, Debug)]
pub struct PostRemoved {
    pub post: Post,
}
impl Event for PostRemoved {}

/// A reply appeared that was not present in the previous document.
#[derive(Clone, Debug)]
pub struct ReplyFound {
    pub reply: Reply,
}
impl Event for ReplyFound {}

/// A reply disappeared from its owner's document.
#[derive(Clone, Debug)]
pub struct ReplyRemoved {
    pub reply: Reply,
}
impl Event for ReplyRemoved {}

/// A rescue fetch has completed, successfully or not.
#[derive(Clone, Debug)]
pub struct RescueFinished {
    pub identity: IdentityId,
    /// Edition that was attempted.
    pub edition: Edition,
    pub success: bool,
}
impl Event for RescueFinished {}

/// An identity's [`IdentityStatus`] changed.
#[derive(Clone, Debug)]
pub struct IdentityStatusChanged {
    pub identity: IdentityId,
    pub status: IdentityStatus,
}
impl Event for IdentityStatusChanged {}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Events buffered per type before slow receivers start lagging.
const CHANNEL_CAPACITY: usize = 256;

type Channels = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Typed fan-out of change notifications.
///
/// Cheap to clone; clones share channels. Emitting never blocks and an
/// event nobody subscribed to is discarded.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<RwLock<Channels>>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// A bus whose per-type channels hold `capacity` undelivered events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Deliver `event` to every live receiver of `E`.
    pub fn emit<E: Event>(&self, event: E) {
        let sender = {
            let channels = self.channels.read().expect("lock poisoned");
            channels.get(&TypeId::of::<E>()).cloned()
        };
        if let Some(sender) = sender.as_deref().and_then(as_sender::<E>) {
            let _ = sender.send(event);
        }
    }

    pub fn subscribe<E: Event>(&self) -> EventReceiver<E> {
        let mut channels = self.channels.write().expect("lock poisoned");
        let capacity = self.capacity;
        let entry = channels.entry(TypeId::of::<E>()).or_insert_with(|| {
            let (tx, _) = broadcast::channel::<E>(capacity);
            Arc::new(tx)
        });
        let rx = match as_sender::<E>(entry.as_ref()) {
            Some(sender) => sender.subscribe(),
            None => unreachable!("channel registered under the wrong TypeId"),
        };
        EventReceiver { rx }
    }
}

fn as_sender<E: Event>(channel: &(dyn Any + Send + Sync)) -> Option<&broadcast::Sender<E>> {
    channel.downcast_ref::<broadcast::Sender<E>>()
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let channels = self.channels.read().expect("lock poisoned");
        f.debug_struct("EventBus")
            .field("event_types", &channels.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventReceiver
// ---------------------------------------------------------------------------

/// Receiving end for one event type, created by [`EventBus::subscribe`].
///
/// A receiver that falls more than the bus capacity behind loses the oldest
/// events and resumes with the oldest one still buffered.
pub struct EventReceiver<E: Event> {
    rx: broadcast::Receiver<E>,
}

impl<E: Event> EventReceiver<E> {
    /// Next event, or `None` once every clone of the bus is gone.
    pub async fn recv(&mut self) -> Option<E> {
        use broadcast::error::RecvError;
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, event = std::any::type_name::<E>(), "dropped events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Like [`recv`](Self::recv) but returns `None` instead of waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        use broadcast::error::TryRecvError;
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}
