//! Registry table: insertion, matching sweeps and filtered removal.

use super::subscription::{PendingDelivery, Subscription};
use crate::action::ActionIdentity;
use crate::hierarchy::{accepts, TypeHierarchy};
use crate::types::{RecipientId, SubscriptionId, Token, TypeKey};
use std::any::TypeId;
use std::collections::HashMap;

/// Criteria for removing subscriptions. `None` fields match anything.
#[derive(Clone, Debug)]
pub(crate) struct RemovalFilter {
    pub recipient: RecipientId,
    pub message_type: Option<TypeId>,
    /// `Some(None)` selects the untokened channel only.
    pub token: Option<Option<Token>>,
    pub action: Option<ActionIdentity>,
    /// Remove only the most recently registered match.
    pub latest_only: bool,
}

impl RemovalFilter {
    pub fn recipient(recipient: RecipientId) -> Self {
        Self {
            recipient,
            message_type: None,
            token: None,
            action: None,
            latest_only: false,
        }
    }

    fn matches(&self, sub: &Subscription) -> bool {
        if sub.recipient.id != self.recipient {
            return false;
        }
        if let Some(message_type) = self.message_type {
            if sub.message_type.id != message_type {
                return false;
            }
        }
        if let Some(ref token) = self.token {
            if sub.token != *token {
                return false;
            }
        }
        if let Some(action) = self.action {
            if sub.action() != action {
                return false;
            }
        }
        true
    }
}

/// Result of a matching sweep.
pub(crate) struct Sweep {
    /// Live matches in registration order.
    pub deliveries: Vec<PendingDelivery>,
    /// Dead rows removed while scanning.
    pub purged: usize,
}

/// All subscriptions, bucketed by registered message type.
pub(crate) struct Registry {
    buckets: HashMap<TypeId, Vec<Subscription>>,
    len: usize,
    next_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
            len: 0,
            next_id: 1,
        }
    }

    /// Allocate the next subscription id.
    pub fn next_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, subscription: Subscription) {
        self.buckets
            .entry(subscription.message_type.id)
            .or_default()
            .push(subscription);
        self.len += 1;
    }

    /// Stored rows, including dead ones not yet purged.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn live_len(&self) -> usize {
        self.buckets
            .values()
            .flatten()
            .filter(|sub| sub.is_alive())
            .count()
    }

    pub fn message_types(&self) -> usize {
        self.buckets.len()
    }

    /// Drop dead rows in one bucket.
    pub fn purge_type(&mut self, message_type: TypeId) -> usize {
        let removed = match self.buckets.get_mut(&message_type) {
            Some(bucket) => retain_counting(bucket, Subscription::is_alive),
            None => 0,
        };
        self.finish_removal(removed)
    }

    /// Drop dead rows everywhere.
    pub fn purge(&mut self) -> usize {
        let removed = self
            .buckets
            .values_mut()
            .map(|bucket| retain_counting(bucket, Subscription::is_alive))
            .sum();
        self.finish_removal(removed)
    }

    /// Remove every row matching `filter`, plus any dead row scanned on the way.
    ///
    /// Returns `(removed, purged)`.
    pub fn remove(&mut self, filter: &RemovalFilter) -> (usize, usize) {
        let latest = if filter.latest_only {
            self.latest_match(filter)
        } else {
            None
        };
        let selects = |sub: &Subscription| match latest {
            Some(id) => sub.id == id,
            None => !filter.latest_only && filter.matches(sub),
        };

        let mut removed = 0;
        let mut purged = 0;

        let mut sweep = |bucket: &mut Vec<Subscription>| {
            bucket.retain(|sub| {
                if selects(sub) {
                    sub.mark_removed();
                    removed += 1;
                    false
                } else if !sub.is_alive() {
                    purged += 1;
                    false
                } else {
                    true
                }
            });
        };

        match filter.message_type {
            Some(message_type) => {
                if let Some(bucket) = self.buckets.get_mut(&message_type) {
                    sweep(bucket);
                }
            }
            None => self.buckets.values_mut().for_each(&mut sweep),
        }

        self.finish_removal(removed + purged);
        (removed, purged)
    }

    fn latest_match(&self, filter: &RemovalFilter) -> Option<SubscriptionId> {
        let rows: Box<dyn Iterator<Item = &Subscription> + '_> = match filter.message_type {
            Some(message_type) => Box::new(self.buckets.get(&message_type).into_iter().flatten()),
            None => Box::new(self.buckets.values().flatten()),
        };
        rows.filter(|sub| filter.matches(sub)).map(|sub| sub.id).max()
    }

    /// Collect live subscriptions that should receive a message of concrete
    /// type `runtime`, purging dead rows in the scanned buckets.
    ///
    /// `candidates` lists every type a message of `runtime` can be delivered
    /// as; only those buckets are scanned.
    pub fn sweep(
        &mut self,
        hierarchy: &TypeHierarchy,
        runtime: TypeId,
        candidates: &[TypeId],
        token: Option<&Token>,
        target: Option<TypeKey>,
    ) -> Sweep {
        let mut deliveries = Vec::new();
        let mut purged = 0;

        for registered in candidates {
            let Some(bucket) = self.buckets.get_mut(registered) else {
                continue;
            };

            bucket.retain(|sub| {
                if !accepts(hierarchy, *registered, sub.include_derived, runtime)
                    || sub.token.as_ref() != token
                    || target.map_or(false, |target| sub.recipient.ty != target)
                {
                    if sub.is_alive() {
                        return true;
                    }
                    purged += 1;
                    return false;
                }

                match sub.prepare() {
                    Some(pending) => {
                        deliveries.push(pending);
                        true
                    }
                    None => {
                        purged += 1;
                        false
                    }
                }
            });
        }

        deliveries.sort_by_key(|pending| pending.id);
        self.finish_removal(purged);
        Sweep { deliveries, purged }
    }

    fn finish_removal(&mut self, removed: usize) -> usize {
        self.len -= removed;
        self.buckets.retain(|_, bucket| !bucket.is_empty());
        removed
    }
}

fn retain_counting<F>(bucket: &mut Vec<Subscription>, keep: F) -> usize
where
    F: Fn(&Subscription) -> bool,
{
    let before = bucket.len();
    bucket.retain(|sub| keep(sub));
    before - bucket.len()
}
