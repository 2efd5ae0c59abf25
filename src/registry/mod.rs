//! Subscription registry.
//!
//! Subscriptions are bucketed by the message type they were registered for
//! and kept in registration order inside each bucket. The registry is purely
//! in-memory and not synchronized; the messenger wraps it in a single lock.
//!
//! Liveness is never cached: every scan re-checks the weak recipient and the
//! weak handler target, and rows found dead are dropped on the spot.

mod subscription;
mod table;

pub(crate) use subscription::{RecipientRef, Subscription};
pub(crate) use table::{RemovalFilter, Registry};
