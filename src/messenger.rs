//! The messenger: registration, dispatch and unregistration.

use crate::action::{
    into_class_parts, into_interface_parts, Action, Delivery, ErasedHandler, TargetHold,
};
use crate::error::{MessengerError, Result};
use crate::hierarchy::TypeHierarchy;
use crate::registry::{RecipientRef, Registry, RemovalFilter, Subscription};
use crate::types::{
    MessengerStats, RecipientId, RegisterOptions, SendOptions, SubscriptionId, Token, TypeKey,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// Messenger configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MessengerConfig {
    /// Name attached to log events.
    pub name: String,

    /// Maximum stored subscriptions (None = unlimited).
    pub max_subscriptions: Option<usize>,

    /// Emit a trace event for every handler invocation.
    pub trace_dispatch: bool,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            max_subscriptions: None,
            trace_dispatch: false,
        }
    }
}

impl MessengerConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

/// An in-process messenger.
///
/// Recipients register [`Action`]s for a message type; [`send`](Self::send)
/// invokes every matching, still-alive registration synchronously on the
/// calling thread in registration order.
///
/// Recipients are always held weakly: once the last `Arc` to a recipient is
/// dropped its subscriptions stop receiving and are purged the next time the
/// messenger touches them. A bound action's target is held weakly too unless
/// the registration asks for [`keep_alive`](RegisterOptions::keep_alive).
///
/// All operations take one registry lock for their bookkeeping. Handlers run
/// after it is released, so they may register, unregister or send.
pub struct Messenger {
    config: MessengerConfig,

    /// Subscription table.
    registry: Mutex<Registry>,

    /// Declared type relationships. Replaced wholesale on every declaration
    /// so a send can keep using the snapshot it started with.
    hierarchy: RwLock<Arc<TypeHierarchy>>,

    sends: AtomicU64,
    deliveries: AtomicU64,
    purged: AtomicU64,
}

impl Messenger {
    /// Create a messenger with the default configuration.
    pub fn new() -> Self {
        Self::with_config(MessengerConfig::default())
    }

    pub fn with_config(config: MessengerConfig) -> Self {
        Self {
            config,
            registry: Mutex::new(Registry::new()),
            hierarchy: RwLock::new(Arc::new(TypeHierarchy::new())),
            sends: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            purged: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &MessengerConfig {
        &self.config
    }

    // --- Type hierarchy ---

    /// Declare that messages of type `D` derive from `B`.
    ///
    /// Subscriptions for `B` registered with `include_derived` then receive
    /// `D` messages, viewed through `upcast`.
    pub fn declare_base<D, B>(&self, upcast: fn(&D) -> &B) -> Result<()>
    where
        D: Any + Send + Sync,
        B: Any + Send + Sync,
    {
        let mut current = self.hierarchy.write();
        let mut next = TypeHierarchy::clone(&current);
        next.declare_base(upcast)?;
        *current = Arc::new(next);
        Ok(())
    }

    /// Declare that messages of type `T` implement the interface `I`.
    pub fn declare_interface<T, I>(&self, view: fn(&T) -> &I)
    where
        T: Any + Send + Sync,
        I: ?Sized + 'static,
    {
        let mut current = self.hierarchy.write();
        let mut next = TypeHierarchy::clone(&current);
        next.declare_interface(view);
        *current = Arc::new(next);
    }

    /// Current hierarchy snapshot.
    pub fn hierarchy(&self) -> Arc<TypeHierarchy> {
        Arc::clone(&self.hierarchy.read())
    }

    // --- Registration ---

    /// Register `action` for messages of exactly type `M` on the default channel.
    pub fn register<R, M>(&self, recipient: &Arc<R>, action: Action<M>) -> Result<SubscriptionId>
    where
        R: Send + Sync + 'static,
        M: Any + Send + Sync,
    {
        self.register_with(recipient, RegisterOptions::default(), action)
    }

    /// Register `action` for messages of type `M` with explicit options.
    pub fn register_with<R, M>(
        &self,
        recipient: &Arc<R>,
        options: RegisterOptions,
        action: Action<M>,
    ) -> Result<SubscriptionId>
    where
        R: Send + Sync + 'static,
        M: Any + Send + Sync,
    {
        let (target, handler) = into_class_parts(action);
        self.insert(recipient, TypeKey::of::<M>(), options, target, handler)
    }

    /// Register `action` for an interface type such as `dyn Trait`.
    ///
    /// Interfaces are never the concrete type of a sent message, so
    /// `include_derived` is required.
    pub fn register_interface<R, I>(
        &self,
        recipient: &Arc<R>,
        options: RegisterOptions,
        action: Action<I>,
    ) -> Result<SubscriptionId>
    where
        R: Send + Sync + 'static,
        I: ?Sized + 'static,
    {
        let message_type = TypeKey::of::<I>();
        if !options.include_derived {
            return Err(MessengerError::InvalidMessageType {
                type_name: message_type.name,
                reason: "interface registrations must include derived types".to_string(),
            });
        }

        let (target, handler) = into_interface_parts(action);
        self.insert(recipient, message_type, options, target, handler)
    }

    fn insert<R: Send + Sync + 'static>(
        &self,
        recipient: &Arc<R>,
        message_type: TypeKey,
        options: RegisterOptions,
        target: Option<Weak<dyn Any + Send + Sync>>,
        handler: Arc<dyn ErasedHandler>,
    ) -> Result<SubscriptionId> {
        // A target already gone stays weak, so the row is purged as dead.
        let target = match target {
            None => TargetHold::Unbound,
            Some(target) if options.keep_alive => match target.upgrade() {
                Some(strong) => TargetHold::Strong(strong),
                None => TargetHold::Weak(target),
            },
            Some(target) => TargetHold::Weak(target),
        };

        let mut registry = self.registry.lock();
        let purged = registry.purge_type(message_type.id);
        self.record_purged(purged);

        if let Some(limit) = self.config.max_subscriptions {
            if registry.len() >= limit {
                let purged = registry.purge();
                self.record_purged(purged);
                if registry.len() >= limit {
                    return Err(MessengerError::CapacityExceeded { limit });
                }
            }
        }

        let id = registry.next_id();
        registry.insert(Subscription {
            id,
            message_type,
            recipient: RecipientRef::new(recipient),
            token: options.token.clone(),
            include_derived: options.include_derived,
            target,
            handler,
            removed: Default::default(),
        });

        debug!(
            messenger = %self.config.name,
            subscription = %id,
            message_type = message_type.name,
            recipient_type = std::any::type_name::<R>(),
            token = ?options.token,
            include_derived = options.include_derived,
            keep_alive = options.keep_alive,
            "registered"
        );

        Ok(id)
    }

    // --- Dispatch ---

    /// Send `message` to every matching registration on the default channel.
    ///
    /// Returns the number of handlers invoked.
    pub fn send<M: Any + Send + Sync>(&self, message: &M) -> Result<usize> {
        self.dispatch(message, TypeKey::of::<M>(), None, None)
    }

    /// Send `message` only to recipients whose concrete type is exactly `T`.
    pub fn send_to<T: 'static, M: Any + Send + Sync>(&self, message: &M) -> Result<usize> {
        self.dispatch(message, TypeKey::of::<M>(), None, Some(TypeKey::of::<T>()))
    }

    /// Send `message` on the channel identified by `token`.
    pub fn send_with_token<M: Any + Send + Sync>(
        &self,
        message: &M,
        token: impl Into<Token>,
    ) -> Result<usize> {
        let token = token.into();
        self.dispatch(message, TypeKey::of::<M>(), Some(&token), None)
    }

    /// Send `message` with both a token and a target type.
    pub fn send_with<M: Any + Send + Sync>(&self, message: &M, options: &SendOptions) -> Result<usize> {
        self.dispatch(message, TypeKey::of::<M>(), options.token.as_ref(), options.target)
    }

    fn dispatch(
        &self,
        message: &dyn Any,
        runtime: TypeKey,
        token: Option<&Token>,
        target: Option<TypeKey>,
    ) -> Result<usize> {
        self.sends.fetch_add(1, Ordering::Relaxed);
        let hierarchy = self.hierarchy();
        let candidates = hierarchy.assignable_types(runtime.id);

        let sweep = {
            let mut registry = self.registry.lock();
            registry.sweep(&hierarchy, runtime.id, &candidates, token, target)
        };
        self.record_purged(sweep.purged);

        if sweep.deliveries.is_empty() {
            trace!(
                messenger = %self.config.name,
                message_type = runtime.name,
                "no recipients"
            );
            return Ok(0);
        }

        let mut delivered = 0;
        for pending in &sweep.deliveries {
            // An earlier handler in this send may have unregistered it.
            if pending.is_removed() {
                continue;
            }

            if self.config.trace_dispatch {
                trace!(
                    messenger = %self.config.name,
                    subscription = %pending.id,
                    message_type = runtime.name,
                    registered_as = pending.message_type.name,
                    recipient_type = pending.recipient_type.name,
                    "delivering"
                );
            }

            match pending
                .handler
                .deliver(pending.target.as_deref(), message, &hierarchy)
            {
                Delivery::Delivered => {
                    delivered += 1;
                    self.deliveries.fetch_add(1, Ordering::Relaxed);
                }
                Delivery::Skipped => {}
                Delivery::Failed(source) => {
                    warn!(
                        messenger = %self.config.name,
                        subscription = %pending.id,
                        message_type = runtime.name,
                        recipient_type = pending.recipient_type.name,
                        error = %source,
                        "handler failed"
                    );
                    return Err(MessengerError::Handler {
                        message_type: runtime.name,
                        recipient_type: pending.recipient_type.name,
                        source,
                    });
                }
            }
        }

        Ok(delivered)
    }

    // --- Unregistration ---

    /// Remove every subscription `recipient` owns.
    pub fn unregister<R: ?Sized>(&self, recipient: &Arc<R>) -> usize {
        self.unregister_id(RecipientId::of(recipient))
    }

    /// Remove every subscription owned by the recipient with this identity.
    pub fn unregister_id(&self, recipient: RecipientId) -> usize {
        self.remove(RemovalFilter::recipient(recipient))
    }

    /// Remove `recipient`'s subscriptions for message type `M`, on any channel.
    pub fn unregister_type<M: ?Sized + 'static, R: ?Sized>(&self, recipient: &Arc<R>) -> usize {
        self.remove(RemovalFilter {
            message_type: Some(TypeId::of::<M>()),
            ..RemovalFilter::recipient(RecipientId::of(recipient))
        })
    }

    /// Remove `recipient`'s subscriptions for message type `M` on `token`'s channel.
    pub fn unregister_token<M: ?Sized + 'static, R: ?Sized>(
        &self,
        recipient: &Arc<R>,
        token: impl Into<Token>,
    ) -> usize {
        self.remove(RemovalFilter {
            message_type: Some(TypeId::of::<M>()),
            token: Some(Some(token.into())),
            ..RemovalFilter::recipient(RecipientId::of(recipient))
        })
    }

    /// Remove `recipient`'s most recent registration of this `action` (or a
    /// clone of it) for `M`, on any channel.
    ///
    /// Stacked registrations of the same action are removed one per call.
    pub fn unregister_action<M: ?Sized + 'static, R: ?Sized>(
        &self,
        recipient: &Arc<R>,
        action: &Action<M>,
    ) -> usize {
        self.remove(RemovalFilter {
            message_type: Some(TypeId::of::<M>()),
            action: Some(action.identity()),
            latest_only: true,
            ..RemovalFilter::recipient(RecipientId::of(recipient))
        })
    }

    /// Remove `recipient`'s most recent registration of this `action` on
    /// `token`'s channel.
    pub fn unregister_token_action<M: ?Sized + 'static, R: ?Sized>(
        &self,
        recipient: &Arc<R>,
        token: impl Into<Token>,
        action: &Action<M>,
    ) -> usize {
        self.remove(RemovalFilter {
            message_type: Some(TypeId::of::<M>()),
            token: Some(Some(token.into())),
            action: Some(action.identity()),
            latest_only: true,
            ..RemovalFilter::recipient(RecipientId::of(recipient))
        })
    }

    fn remove(&self, filter: RemovalFilter) -> usize {
        let (removed, purged) = self.registry.lock().remove(&filter);
        self.record_purged(purged);

        if removed > 0 {
            debug!(
                messenger = %self.config.name,
                recipient = ?filter.recipient,
                token = ?filter.token,
                removed,
                "unregistered"
            );
        }
        removed
    }

    // --- Maintenance ---

    /// Remove every dead subscription now instead of lazily.
    pub fn purge(&self) -> usize {
        let purged = self.registry.lock().purge();
        self.record_purged(purged);
        purged
    }

    /// Stored subscriptions, including dead ones not yet purged.
    pub fn subscription_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn stats(&self) -> MessengerStats {
        let registry = self.registry.lock();
        MessengerStats {
            subscriptions: registry.len(),
            live_subscriptions: registry.live_len(),
            message_types: registry.message_types(),
            sends: self.sends.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
        }
    }

    fn record_purged(&self, purged: usize) {
        if purged > 0 {
            self.purged.fetch_add(purged as u64, Ordering::Relaxed);
            debug!(messenger = %self.config.name, purged, "purged dead subscriptions");
        }
    }
}

impl Default for Messenger {
    fn default() -> Self {
        Self::new()
    }
}
