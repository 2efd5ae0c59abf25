//! Message handlers.
//!
//! An [`Action`] is the callback a recipient registers. It is either a plain
//! closure, or a closure bound to a separate *target* object that it receives
//! as its first argument. An action only refers to its target weakly, so a
//! recipient may keep a clone of its own action. The messenger decides per
//! registration whether the bound target is then held strongly or weakly.
//!
//! Clones of an action share one callback allocation; that allocation is the
//! action's identity when a single registration is removed again.

use crate::error::HandlerError;
use crate::hierarchy::TypeHierarchy;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

type Callback<M> =
    dyn Fn(Option<&(dyn Any + Send + Sync)>, &M) -> Result<(), HandlerError> + Send + Sync;

/// A handler for messages of type `M`.
pub struct Action<M: ?Sized + 'static> {
    target: Option<Weak<dyn Any + Send + Sync>>,
    callback: Arc<Callback<M>>,
}

impl<M: ?Sized + 'static> Action<M> {
    /// Wrap an infallible closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        Self {
            target: None,
            callback: Arc::new(move |_: Option<&(dyn Any + Send + Sync)>, message: &M| {
                f(message);
                Ok(())
            }),
        }
    }

    /// Wrap a fallible closure. An error aborts the send that invoked it.
    pub fn try_new<F, E>(f: F) -> Self
    where
        F: Fn(&M) -> Result<(), E> + Send + Sync + 'static,
        E: Into<HandlerError>,
    {
        Self {
            target: None,
            callback: Arc::new(move |_: Option<&(dyn Any + Send + Sync)>, message: &M| {
                f(message).map_err(Into::into)
            }),
        }
    }

    /// Bind `f` to `target`. The target is passed to `f` on every delivery.
    pub fn bound<T, F>(target: &Arc<T>, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &M) + Send + Sync + 'static,
    {
        Self::try_bound(target, move |target: &T, message: &M| {
            f(target, message);
            Ok::<(), HandlerError>(())
        })
    }

    /// Bind a fallible `f` to `target`.
    pub fn try_bound<T, F, E>(target: &Arc<T>, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &M) -> Result<(), E> + Send + Sync + 'static,
        E: Into<HandlerError>,
    {
        let target: Arc<dyn Any + Send + Sync> = target.clone();
        Self {
            target: Some(Arc::downgrade(&target)),
            callback: Arc::new(
                move |target: Option<&(dyn Any + Send + Sync)>, message: &M| {
                    match target.and_then(|target| target.downcast_ref::<T>()) {
                        Some(target) => f(target, message).map_err(Into::into),
                        None => Ok(()),
                    }
                },
            ),
        }
    }

    /// Whether this action carries a bound target.
    pub fn is_bound(&self) -> bool {
        self.target.is_some()
    }

    /// True if both actions are clones of the same callback.
    pub fn same_as(&self, other: &Action<M>) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }

    pub(crate) fn identity(&self) -> ActionIdentity {
        ActionIdentity(Arc::as_ptr(&self.callback) as *const () as usize)
    }
}

impl<M: ?Sized + 'static> Clone for Action<M> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<M: ?Sized + 'static> fmt::Debug for Action<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("message", &std::any::type_name::<M>())
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Identity of an action's callback allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ActionIdentity(usize);

/// How a stored handler holds its target.
pub(crate) enum TargetHold {
    Unbound,
    Strong(Arc<dyn Any + Send + Sync>),
    Weak(Weak<dyn Any + Send + Sync>),
}

impl TargetHold {
    pub(crate) fn is_alive(&self) -> bool {
        match self {
            TargetHold::Unbound | TargetHold::Strong(_) => true,
            TargetHold::Weak(weak) => weak.strong_count() > 0,
        }
    }

    /// Upgrade for one delivery. `None` means the target is gone.
    pub(crate) fn upgrade(&self) -> Option<Option<Arc<dyn Any + Send + Sync>>> {
        match self {
            TargetHold::Unbound => Some(None),
            TargetHold::Strong(target) => Some(Some(Arc::clone(target))),
            TargetHold::Weak(weak) => weak.upgrade().map(Some),
        }
    }
}

/// Outcome of offering a message to a handler.
#[derive(Debug)]
pub(crate) enum Delivery {
    Delivered,
    /// The message could not be viewed as the handler's type.
    Skipped,
    Failed(HandlerError),
}

/// Type-erased handler stored in the registry.
pub(crate) trait ErasedHandler: Send + Sync {
    fn identity(&self) -> ActionIdentity;

    fn deliver(
        &self,
        target: Option<&(dyn Any + Send + Sync)>,
        message: &dyn Any,
        hierarchy: &TypeHierarchy,
    ) -> Delivery;
}

/// Handler for a sized message type, reachable exactly or through bases.
pub(crate) struct ClassHandler<M: 'static> {
    pub(crate) callback: Arc<Callback<M>>,
}

impl<M: Any + Send + Sync> ErasedHandler for ClassHandler<M> {
    fn identity(&self) -> ActionIdentity {
        ActionIdentity(Arc::as_ptr(&self.callback) as *const () as usize)
    }

    fn deliver(
        &self,
        target: Option<&(dyn Any + Send + Sync)>,
        message: &dyn Any,
        hierarchy: &TypeHierarchy,
    ) -> Delivery {
        let view = match message.downcast_ref::<M>() {
            Some(exact) => Some(exact),
            None => hierarchy.upcast::<M>(message),
        };
        invoke(&*self.callback, target, view)
    }
}

/// Handler for an unsized interface type such as `dyn Trait`.
pub(crate) struct InterfaceHandler<I: ?Sized + 'static> {
    pub(crate) callback: Arc<Callback<I>>,
}

impl<I: ?Sized + 'static> ErasedHandler for InterfaceHandler<I> {
    fn identity(&self) -> ActionIdentity {
        ActionIdentity(Arc::as_ptr(&self.callback) as *const () as usize)
    }

    fn deliver(
        &self,
        target: Option<&(dyn Any + Send + Sync)>,
        message: &dyn Any,
        hierarchy: &TypeHierarchy,
    ) -> Delivery {
        invoke(&*self.callback, target, hierarchy.interface_view::<I>(message))
    }
}

fn invoke<M: ?Sized>(
    callback: &Callback<M>,
    target: Option<&(dyn Any + Send + Sync)>,
    view: Option<&M>,
) -> Delivery {
    match view {
        Some(message) => match callback(target, message) {
            Ok(()) => Delivery::Delivered,
            Err(e) => Delivery::Failed(e),
        },
        None => Delivery::Skipped,
    }
}

/// Split an action into the pieces the registry stores.
pub(crate) fn into_class_parts<M: Any + Send + Sync>(
    action: Action<M>,
) -> (Option<Weak<dyn Any + Send + Sync>>, Arc<dyn ErasedHandler>) {
    let handler = ClassHandler {
        callback: action.callback,
    };
    (action.target, Arc::new(handler))
}

pub(crate) fn into_interface_parts<I: ?Sized + 'static>(
    action: Action<I>,
) -> (Option<Weak<dyn Any + Send + Sync>>, Arc<dyn ErasedHandler>) {
    let handler = InterfaceHandler {
        callback: action.callback,
    };
    (action.target, Arc::new(handler))
}
