//! Declared type relationships between message types.
//!
//! Rust has no class inheritance, so the messenger learns which message types
//! "derive from" or "implement" others from explicit declarations:
//!
//! - [`TypeHierarchy::declare_base`] records that a sized message type embeds
//!   a sized base message type and can be viewed as it.
//! - [`TypeHierarchy::declare_interface`] records that a message type can be
//!   viewed as an unsized interface, typically `dyn Trait`.
//!
//! Base relationships are transitive, and interfaces declared on a base are
//! implemented by all of its subtypes.

use crate::error::{MessengerError, Result};
use crate::types::TypeKey;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

type BaseCast = Arc<dyn Fn(&dyn Any) -> Option<&dyn Any> + Send + Sync>;

/// Typed cast from an erased message to an interface view.
struct InterfaceCast<I: ?Sized + 'static> {
    cast: Arc<dyn Fn(&dyn Any) -> Option<&I> + Send + Sync>,
}

fn base_cast<F>(cast: F) -> BaseCast
where
    F: for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync + 'static,
{
    Arc::new(cast)
}

fn interface_cast<I, F>(cast: F) -> InterfaceCast<I>
where
    I: ?Sized + 'static,
    F: for<'a> Fn(&'a dyn Any) -> Option<&'a I> + Send + Sync + 'static,
{
    InterfaceCast {
        cast: Arc::new(cast),
    }
}

#[derive(Clone)]
struct BaseEdge {
    base: TypeKey,
    cast: BaseCast,
}

#[derive(Clone)]
struct InterfaceEdge {
    interface: TypeKey,
    /// Holds an `InterfaceCast<I>` for the edge's interface.
    cast: Arc<dyn Any + Send + Sync>,
}

/// Registry of declared subtype and interface relationships.
#[derive(Clone, Default)]
pub struct TypeHierarchy {
    bases: HashMap<TypeId, Vec<BaseEdge>>,
    interfaces: HashMap<TypeId, Vec<InterfaceEdge>>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `D` derives from `B`, reachable through `upcast`.
    pub fn declare_base<D, B>(&mut self, upcast: fn(&D) -> &B) -> Result<()>
    where
        D: Any + Send + Sync,
        B: Any + Send + Sync,
    {
        let derived = TypeKey::of::<D>();
        let base = TypeKey::of::<B>();

        if derived == base || self.is_base_of(derived.id, base.id) {
            return Err(MessengerError::InvalidMessageType {
                type_name: derived.name,
                reason: format!("declaring {} as its base would form a cycle", base.name),
            });
        }

        let edges = self.bases.entry(derived.id).or_default();
        if edges.iter().any(|edge| edge.base == base) {
            return Ok(());
        }

        let cast = base_cast(move |message| {
            message
                .downcast_ref::<D>()
                .map(|derived| upcast(derived) as &dyn Any)
        });
        edges.push(BaseEdge { base, cast });
        Ok(())
    }

    /// Declare that `T` implements the interface `I`, reachable through `view`.
    pub fn declare_interface<T, I>(&mut self, view: fn(&T) -> &I)
    where
        T: Any + Send + Sync,
        I: ?Sized + 'static,
    {
        let interface = TypeKey::of::<I>();
        let edges = self.interfaces.entry(TypeId::of::<T>()).or_default();
        if edges.iter().any(|edge| edge.interface == interface) {
            return;
        }

        let cast = interface_cast::<I, _>(move |message| message.downcast_ref::<T>().map(view));
        edges.push(InterfaceEdge {
            interface,
            cast: Arc::new(cast),
        });
    }

    /// True if `base` is a (transitive) base of `derived`.
    fn is_base_of(&self, base: TypeId, derived: TypeId) -> bool {
        self.base_closure(derived).iter().skip(1).any(|key| *key == base)
    }

    /// `ty` followed by all of its transitive bases, breadth first.
    fn base_closure(&self, ty: TypeId) -> Vec<TypeId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([ty]);

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            order.push(current);
            if let Some(edges) = self.bases.get(&current) {
                queue.extend(edges.iter().map(|edge| edge.base.id));
            }
        }

        order
    }

    /// Every type a message of type `ty` can be delivered as: `ty` itself,
    /// its transitive bases and all interfaces any of them implements.
    pub fn assignable_types(&self, ty: TypeId) -> Vec<TypeId> {
        let mut types = self.base_closure(ty);
        let mut interfaces = Vec::new();
        for key in &types {
            if let Some(edges) = self.interfaces.get(key) {
                for edge in edges {
                    if !types.contains(&edge.interface.id) && !interfaces.contains(&edge.interface.id) {
                        interfaces.push(edge.interface.id);
                    }
                }
            }
        }
        types.extend(interfaces);
        types
    }

    /// True if a message of type `runtime` can be viewed as `target`.
    pub fn is_assignable(&self, runtime: TypeId, target: TypeId) -> bool {
        runtime == target || self.assignable_types(runtime).contains(&target)
    }

    /// Views of `message` as itself and each of its bases, breadth first.
    fn base_views<'a>(&self, message: &'a dyn Any) -> Vec<&'a dyn Any> {
        let mut seen = HashSet::new();
        let mut views = Vec::new();
        let mut queue = VecDeque::from([message]);

        while let Some(view) = queue.pop_front() {
            if !seen.insert(view.type_id()) {
                continue;
            }
            if let Some(edges) = self.bases.get(&view.type_id()) {
                queue.extend(edges.iter().filter_map(|edge| (edge.cast)(view)));
            }
            views.push(view);
        }

        views
    }

    /// View `message` as the sized type `B` (itself or one of its bases).
    pub fn upcast<'a, B: Any>(&self, message: &'a dyn Any) -> Option<&'a B> {
        self.base_views(message)
            .into_iter()
            .find_map(|view| view.downcast_ref::<B>())
    }

    /// View `message` as the interface `I`.
    pub fn interface_view<'a, I: ?Sized + 'static>(&self, message: &'a dyn Any) -> Option<&'a I> {
        let interface = TypeId::of::<I>();
        for view in self.base_views(message) {
            let Some(edges) = self.interfaces.get(&view.type_id()) else {
                continue;
            };
            for edge in edges.iter().filter(|edge| edge.interface.id == interface) {
                if let Some(cast) = edge.cast.downcast_ref::<InterfaceCast<I>>() {
                    if let Some(found) = (cast.cast)(view) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }

    /// Number of declared relationships.
    pub fn len(&self) -> usize {
        self.bases.values().map(Vec::len).sum::<usize>()
            + self.interfaces.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether a subscription registered for `registered` accepts a message whose
/// concrete type is `runtime`.
pub fn accepts(
    hierarchy: &TypeHierarchy,
    registered: TypeId,
    include_derived: bool,
    runtime: TypeId,
) -> bool {
    if registered == runtime {
        return true;
    }
    include_derived && hierarchy.is_assignable(runtime, registered)
}
