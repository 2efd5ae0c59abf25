//! Cleanup hooks and the view-model base.

use crate::error::Result;
use crate::messenger::Messenger;
use crate::observable::{Observable, PropertyNotifier};
use crate::types::RecipientId;
use std::any::Any;
use std::sync::{Arc, Weak};

/// Releases resources held by an instance without dropping it.
pub trait Cleanup {
    fn cleanup(&self);
}

/// Shared state for view models: a property notifier plus the messenger the
/// view model talks through.
///
/// The base keeps a weak back-reference to the view model that owns it, so
/// [`Cleanup::cleanup`] can unregister the owner. Build the owner with
/// [`Arc::new_cyclic`] to hand that reference in during construction:
///
/// ```ignore
/// let vm = Arc::new_cyclic(|me| OrdersViewModel {
///     base: ViewModelBase::new(Arc::clone(&messenger), me),
///     ..
/// });
/// ```
pub struct ViewModelBase {
    notifier: PropertyNotifier,
    messenger: Arc<Messenger>,
    owner: Weak<dyn Any + Send + Sync>,
}

impl ViewModelBase {
    pub fn new<VM>(messenger: Arc<Messenger>, owner: &Weak<VM>) -> Self
    where
        VM: Observable + Send + Sync + 'static,
    {
        let owner: Weak<dyn Any + Send + Sync> = owner.clone();
        Self {
            notifier: PropertyNotifier::of::<VM>(),
            messenger,
            owner,
        }
    }

    pub fn notifier(&self) -> &PropertyNotifier {
        &self.notifier
    }

    pub fn messenger(&self) -> &Arc<Messenger> {
        &self.messenger
    }

    /// Recipient identity of the owning view model.
    pub fn owner_id(&self) -> RecipientId {
        RecipientId::of_weak(&self.owner)
    }

    /// Send `message` through this view model's messenger.
    pub fn broadcast<M: Any + Send + Sync>(&self, message: &M) -> Result<usize> {
        self.messenger.send(message)
    }
}

impl Cleanup for ViewModelBase {
    /// Drop every subscription the owning view model registered.
    fn cleanup(&self) {
        self.messenger.unregister_id(self.owner_id());
    }
}

impl std::fmt::Debug for ViewModelBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewModelBase")
            .field("owner", &self.owner_id())
            .field("notifier", &self.notifier)
            .finish()
    }
}
