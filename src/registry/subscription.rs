//! Registry rows.

use crate::action::{ActionIdentity, ErasedHandler, TargetHold};
use crate::types::{RecipientId, SubscriptionId, Token, TypeKey};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Weak back-reference to the recipient that owns a subscription.
pub(crate) struct RecipientRef {
    pub id: RecipientId,
    pub ty: TypeKey,
    weak: Weak<dyn Any + Send + Sync>,
}

impl RecipientRef {
    pub fn new<R: Send + Sync + 'static>(recipient: &Arc<R>) -> Self {
        let strong: Arc<dyn Any + Send + Sync> = recipient.clone();
        Self {
            id: RecipientId::of(recipient),
            ty: TypeKey::of::<R>(),
            weak: Arc::downgrade(&strong),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.weak.strong_count() > 0
    }

    pub fn upgrade(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.weak.upgrade()
    }
}

/// A single registration. Immutable once created, apart from its removal flag.
pub(crate) struct Subscription {
    pub id: SubscriptionId,
    pub message_type: TypeKey,
    pub recipient: RecipientRef,
    pub token: Option<Token>,
    pub include_derived: bool,
    pub target: TargetHold,
    pub handler: Arc<dyn ErasedHandler>,
    /// Set once the row is unregistered. Shared with in-flight deliveries.
    pub removed: Arc<AtomicBool>,
}

impl Subscription {
    /// Dead once the recipient or a weakly held target is gone.
    pub fn is_alive(&self) -> bool {
        self.recipient.is_alive() && self.target.is_alive()
    }

    pub fn action(&self) -> ActionIdentity {
        self.handler.identity()
    }

    pub fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    /// Upgrade everything a delivery needs. `None` if the row is dead.
    pub fn prepare(&self) -> Option<PendingDelivery> {
        let recipient = self.recipient.upgrade()?;
        let target = self.target.upgrade()?;
        Some(PendingDelivery {
            id: self.id,
            message_type: self.message_type,
            recipient_type: self.recipient.ty,
            _recipient: recipient,
            target,
            handler: Arc::clone(&self.handler),
            removed: Arc::clone(&self.removed),
        })
    }
}

/// A matched subscription with strong references held for one send.
pub(crate) struct PendingDelivery {
    pub id: SubscriptionId,
    pub message_type: TypeKey,
    pub recipient_type: TypeKey,
    /// Keeps the recipient alive until the handler returns.
    _recipient: Arc<dyn Any + Send + Sync>,
    pub target: Option<Arc<dyn Any + Send + Sync>>,
    pub handler: Arc<dyn ErasedHandler>,
    removed: Arc<AtomicBool>,
}

impl PendingDelivery {
    /// True if the subscription was unregistered after this send matched it.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }
}
