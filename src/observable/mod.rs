//! Property-change notification for bindable objects.
//!
//! A type with observable properties owns a [`PropertyNotifier`] and lists its
//! property names in [`Observable::PROPERTIES`]. Raising a change for a name
//! that is not listed is reported as an error in debug builds; release builds
//! skip the check.
//!
//! # Example
//!
//! ```ignore
//! struct Profile {
//!     notifier: PropertyNotifier,
//!     name: String,
//! }
//!
//! impl Observable for Profile {
//!     const PROPERTIES: &'static [&'static str] = &["name"];
//!     fn notifier(&self) -> &PropertyNotifier {
//!         &self.notifier
//!     }
//! }
//!
//! let mut profile = Profile { notifier: PropertyNotifier::of::<Profile>(), name: String::new() };
//! profile.notifier.subscribe(|change| println!("{:?} changed", change.property_name));
//! profile.notifier.set(&mut profile.name, "Ada".to_string(), "name")?;
//! ```

mod notifier;

pub use notifier::{ListenerId, PropertyChanged, PropertyNotifier};

use crate::error::Result;

/// An object whose properties raise change notifications.
pub trait Observable {
    /// Names of every observable property.
    const PROPERTIES: &'static [&'static str];

    fn notifier(&self) -> &PropertyNotifier;

    /// Check that `name` is one of [`Self::PROPERTIES`] (debug builds only).
    fn verify_property_name(&self, name: &str) -> Result<()> {
        self.notifier().verify_property_name(name)
    }

    /// Notify listeners that `name` changed.
    fn raise_property_changed(&self, name: &str) -> Result<()> {
        self.notifier().raise(name)
    }

    /// Assign `value` to `field`, raising `name` only if the value changed.
    fn set_property<T: PartialEq>(&self, field: &mut T, value: T, name: &str) -> Result<bool> {
        self.notifier().set(field, value, name)
    }
}
