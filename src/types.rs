//! Core types for the messenger.

use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// Unique identifier for a subscription.
///
/// Identifiers are handed out in increasing order, so they also record
/// registration order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a recipient: the address of its shared allocation.
///
/// Two recipients are the same only if they are the same allocation, never
/// because their values compare equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecipientId(usize);

impl RecipientId {
    /// Identity of a strongly held recipient.
    pub fn of<R: ?Sized>(recipient: &Arc<R>) -> Self {
        RecipientId(Arc::as_ptr(recipient) as *const () as usize)
    }

    /// Identity of a weakly held recipient (valid even after it was dropped).
    pub fn of_weak<R: ?Sized>(recipient: &Weak<R>) -> Self {
        RecipientId(Weak::as_ptr(recipient) as *const () as usize)
    }
}

impl fmt::Debug for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecipientId({:#x})", self.0)
    }
}

/// A type known to the messenger: its `TypeId` plus a readable name.
#[derive(Clone, Copy)]
pub struct TypeKey {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Object-safe view of a token value.
trait TokenValue: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn eq_value(&self, other: &dyn TokenValue) -> bool;
    fn hash_value(&self) -> u64;
}

impl<T> TokenValue for T
where
    T: Any + Eq + Hash + Send + Sync + fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_value(&self, other: &dyn TokenValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }

    fn hash_value(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        TypeId::of::<T>().hash(&mut hasher);
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Channel token scoping delivery to a sub-channel of a message type.
///
/// Tokens compare by value: two tokens are equal when they wrap the same
/// concrete type and the wrapped values are `==`.
#[derive(Clone)]
pub struct Token(Arc<dyn TokenValue>);

impl Token {
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Eq + Hash + Send + Sync + fmt::Debug,
    {
        Token(Arc::new(value))
    }

    /// Borrow the wrapped value if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_value(other.0.as_ref())
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash_value());
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?})", self.0)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Token::new(value.to_string())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Token::new(value)
    }
}

impl From<u64> for Token {
    fn from(value: u64) -> Self {
        Token::new(value)
    }
}

impl From<i32> for Token {
    fn from(value: i32) -> Self {
        Token::new(value)
    }
}

/// Options for a registration.
#[derive(Clone, Debug, Default)]
pub struct RegisterOptions {
    /// Channel token (None = default, untokened channel).
    pub token: Option<Token>,

    /// Also receive messages whose type derives from, or implements, the
    /// registered type.
    pub include_derived: bool,

    /// Hold a bound action's target strongly.
    pub keep_alive: bool,
}

impl RegisterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(mut self, token: impl Into<Token>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn include_derived(mut self) -> Self {
        self.include_derived = true;
        self
    }

    pub fn keep_alive(mut self) -> Self {
        self.keep_alive = true;
        self
    }
}

/// Options narrowing a single send.
#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    /// Only subscriptions registered with an equal token receive the message.
    pub token: Option<Token>,

    /// Only recipients whose concrete type is exactly this one receive it.
    pub target: Option<TypeKey>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(mut self, token: impl Into<Token>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn target<T: 'static>(mut self) -> Self {
        self.target = Some(TypeKey::of::<T>());
        self
    }
}

/// Snapshot of messenger counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessengerStats {
    /// Stored subscriptions, including dead ones not yet purged.
    pub subscriptions: usize,
    /// Subscriptions whose recipient and target are still alive.
    pub live_subscriptions: usize,
    /// Distinct registered message types.
    pub message_types: usize,
    /// Total `send` calls.
    pub sends: u64,
    /// Total handler invocations.
    pub deliveries: u64,
    /// Total dead subscriptions purged.
    pub purged: u64,
}
