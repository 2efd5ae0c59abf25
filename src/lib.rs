//! # Messenger
//!
//! An in-process publish/subscribe messenger that decouples producers and
//! consumers of typed messages without either side holding a durable
//! reference to the other.
//!
//! ## Core Concepts
//!
//! - **Recipients**: any `Arc`-shared object; held weakly, keyed by identity
//! - **Actions**: handlers, optionally bound to a weakly or strongly held target
//! - **Tokens**: value-compared channel scopes within one message type
//! - **Hierarchy**: declared base types and interfaces for derived delivery
//!
//! ## Example
//!
//! ```ignore
//! use mvvm_messenger::{Action, Messenger, RegisterOptions};
//! use std::sync::Arc;
//!
//! struct OrderPlaced { id: u64 }
//! struct Dashboard;
//!
//! let messenger = Messenger::new();
//! let dashboard = Arc::new(Dashboard);
//!
//! messenger.register(&dashboard, Action::<OrderPlaced>::new(|order| {
//!     println!("order {}", order.id);
//! }))?;
//!
//! // Only recipients registered on the "eu" channel
//! messenger.register_with(
//!     &dashboard,
//!     RegisterOptions::new().token("eu"),
//!     Action::<OrderPlaced>::new(|_| {}),
//! )?;
//!
//! messenger.send(&OrderPlaced { id: 7 })?;
//! messenger.send_with_token(&OrderPlaced { id: 8 }, "eu")?;
//!
//! // Dropping the last Arc to the recipient ends its subscriptions.
//! drop(dashboard);
//! ```

pub mod action;
pub mod error;
pub mod hierarchy;
pub mod lifecycle;
pub mod messenger;
pub mod observable;
mod registry;
pub mod types;

// Re-exports
pub use action::Action;
pub use error::{HandlerError, MessengerError, Result};
pub use hierarchy::{accepts, TypeHierarchy};
pub use lifecycle::{Cleanup, ViewModelBase};
pub use messenger::{Messenger, MessengerConfig};
pub use observable::{ListenerId, Observable, PropertyChanged, PropertyNotifier};
pub use types::*;
