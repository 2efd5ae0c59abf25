//! Multicast property-change notifier.

use super::Observable;
use crate::error::{MessengerError, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A property changed. `None` means every property may have changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChanged {
    pub property_name: Option<String>,
}

/// Identifier of a registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

#[derive(Clone)]
enum Listener {
    Callback(Arc<dyn Fn(&PropertyChanged) + Send + Sync>),
    Channel(Sender<PropertyChanged>),
}

impl Listener {
    /// Returns false if the listener is gone and should be dropped.
    fn notify(&self, event: &PropertyChanged) -> bool {
        match self {
            Listener::Callback(callback) => {
                callback(event);
                true
            }
            Listener::Channel(sender) => match sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
            },
        }
    }
}

/// Listener list owned by an observable object.
pub struct PropertyNotifier {
    owner: &'static str,
    properties: &'static [&'static str],
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl PropertyNotifier {
    /// Notifier for `owner`, validating names against `properties`.
    pub fn new(owner: &'static str, properties: &'static [&'static str]) -> Self {
        Self {
            owner,
            properties,
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Notifier for the observable type `T`.
    pub fn of<T: Observable>() -> Self {
        Self::new(std::any::type_name::<T>(), T::PROPERTIES)
    }

    /// Call `f` on every change.
    pub fn subscribe<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&PropertyChanged) + Send + Sync + 'static,
    {
        self.add(Listener::Callback(Arc::new(f)))
    }

    /// Receive changes on a bounded channel. The channel is dropped once it
    /// is full or its receiver is gone.
    pub fn subscribe_channel(&self, buffer: usize) -> Receiver<PropertyChanged> {
        let (sender, receiver) = bounded(buffer);
        self.add(Listener::Channel(sender));
        receiver
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn add(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push((id, listener));
        id
    }

    /// Check `name` against the declared properties (debug builds only).
    pub fn verify_property_name(&self, name: &str) -> Result<()> {
        if cfg!(debug_assertions)
            && !name.is_empty()
            && !self.properties.iter().any(|property| *property == name)
        {
            return Err(MessengerError::UnknownProperty {
                type_name: self.owner,
                property: name.to_string(),
            });
        }
        Ok(())
    }

    /// Notify every listener that `name` changed.
    pub fn raise(&self, name: &str) -> Result<()> {
        self.verify_property_name(name)?;
        self.broadcast(PropertyChanged {
            property_name: Some(name.to_string()),
        });
        Ok(())
    }

    /// Notify every listener that all properties may have changed.
    pub fn raise_all(&self) {
        self.broadcast(PropertyChanged {
            property_name: None,
        });
    }

    /// Assign `value` to `field` and raise `name` if it changed.
    ///
    /// Returns whether a notification was raised.
    pub fn set<T: PartialEq>(&self, field: &mut T, value: T, name: &str) -> Result<bool> {
        if *field == value {
            return Ok(false);
        }
        *field = value;
        self.raise(name)?;
        Ok(true)
    }

    fn broadcast(&self, event: PropertyChanged) {
        // Listeners may subscribe from inside a callback, so none is invoked
        // while the list is locked.
        let listeners = self.listeners.read().clone();

        let mut to_remove = Vec::new();
        for (id, listener) in &listeners {
            if !listener.notify(&event) {
                to_remove.push(*id);
            }
        }

        if !to_remove.is_empty() {
            self.listeners
                .write()
                .retain(|(id, _)| !to_remove.contains(id));
        }
    }
}

impl std::fmt::Debug for PropertyNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyNotifier")
            .field("owner", &self.owner)
            .field("listeners", &self.listener_count())
            .finish()
    }
}
