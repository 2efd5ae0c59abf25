//! Weak holding of recipients and handler targets, and bulk unregistration.

use mvvm_messenger::{Action, Messenger, RecipientId, RegisterOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

#[derive(Debug)]
struct Tick;

#[derive(Debug)]
struct Tock;

#[derive(Default)]
struct Clock {
    ticks: AtomicUsize,
}

impl Clock {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn ticks(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }
}

fn tick_action(clock: &Arc<Clock>) -> Action<Tick> {
    Action::bound(clock, |clock, _| {
        clock.ticks.fetch_add(1, Ordering::SeqCst);
    })
}

// --- Weak Recipients ---

#[test]
fn test_dropped_recipient_stops_receiving_and_is_purged() {
    let messenger = Messenger::new();
    let kept = Clock::new();
    let dropped = Clock::new();

    messenger.register(&kept, tick_action(&kept)).unwrap();
    messenger.register(&dropped, tick_action(&dropped)).unwrap();
    assert_eq!(messenger.subscription_count(), 2);

    let witness: Weak<Clock> = Arc::downgrade(&dropped);
    drop(dropped);
    assert!(witness.upgrade().is_none());

    assert_eq!(messenger.send(&Tick).unwrap(), 1);
    assert_eq!(messenger.subscription_count(), 1);
    assert_eq!(messenger.stats().purged, 1);
}

#[test]
fn test_unbound_closure_lives_as_long_as_recipient() {
    let messenger = Messenger::new();
    let recipient = Clock::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&counter);

    messenger
        .register(
            &recipient,
            Action::<Tick>::new(move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

    messenger.send(&Tick).unwrap();
    drop(recipient);
    messenger.send(&Tick).unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(messenger.subscription_count(), 0);
}

#[test]
fn test_messenger_does_not_keep_recipient_alive() {
    let messenger = Messenger::new();
    let clock = Clock::new();
    messenger.register(&clock, tick_action(&clock)).unwrap();

    assert_eq!(Arc::strong_count(&clock), 1);
}

#[test]
fn test_recipient_holding_its_own_action_is_collected() {
    #[derive(Default)]
    struct Panel {
        ticks: AtomicUsize,
        on_tick: Mutex<Option<Action<Tick>>>,
    }

    let messenger = Messenger::new();
    let panel = Arc::new(Panel::default());
    let action = Action::<Tick>::bound(&panel, |panel, _| {
        panel.ticks.fetch_add(1, Ordering::SeqCst);
    });
    *panel.on_tick.lock() = Some(action.clone());
    messenger.register(&panel, action).unwrap();

    assert_eq!(messenger.send(&Tick).unwrap(), 1);
    assert_eq!(Arc::strong_count(&panel), 1);

    // The stored clone still identifies the registration.
    let stored = panel.on_tick.lock().clone().unwrap();
    assert_eq!(messenger.unregister_action(&panel, &stored), 1);
    messenger.register(&panel, stored).unwrap();

    let witness = Arc::downgrade(&panel);
    drop(panel);
    assert!(witness.upgrade().is_none());

    assert_eq!(messenger.send(&Tick).unwrap(), 0);
    assert_eq!(messenger.subscription_count(), 0);
}

// --- Handler Targets ---

#[test]
fn test_weak_target_expires_independently_of_recipient() {
    let messenger = Messenger::new();
    let owner = Clock::new();
    let target = Clock::new();

    messenger.register(&owner, tick_action(&target)).unwrap();
    messenger.send(&Tick).unwrap();
    assert_eq!(target.ticks(), 1);

    drop(target);
    assert_eq!(messenger.send(&Tick).unwrap(), 0);
    assert_eq!(messenger.subscription_count(), 0);
}

#[test]
fn test_keep_alive_holds_target() {
    let messenger = Messenger::new();
    let owner = Clock::new();
    let target = Clock::new();
    let witness = Arc::downgrade(&target);

    messenger
        .register_with(
            &owner,
            RegisterOptions::new().keep_alive(),
            tick_action(&target),
        )
        .unwrap();
    drop(target);

    assert_eq!(messenger.send(&Tick).unwrap(), 1);
    assert_eq!(witness.upgrade().unwrap().ticks(), 1);

    // Unregistering releases the strong hold.
    messenger.unregister(&owner);
    assert!(witness.upgrade().is_none());
}

#[test]
fn test_keep_alive_does_not_outlive_recipient() {
    let messenger = Messenger::new();
    let owner = Clock::new();
    let target = Clock::new();

    messenger
        .register_with(
            &owner,
            RegisterOptions::new().keep_alive(),
            tick_action(&target),
        )
        .unwrap();
    drop(owner);

    assert_eq!(messenger.send(&Tick).unwrap(), 0);
    assert_eq!(target.ticks(), 0);
}

#[test]
fn test_keep_alive_with_target_already_gone() {
    let messenger = Messenger::new();
    let owner = Clock::new();
    let target = Clock::new();
    let action = tick_action(&target);
    drop(target);

    messenger
        .register_with(&owner, RegisterOptions::new().keep_alive(), action)
        .unwrap();

    assert_eq!(messenger.send(&Tick).unwrap(), 0);
    assert_eq!(messenger.subscription_count(), 0);
}

#[test]
fn test_explicit_purge() {
    let messenger = Messenger::new();
    let clocks: Vec<_> = (0..5).map(|_| Clock::new()).collect();
    for clock in &clocks {
        messenger.register(clock, tick_action(clock)).unwrap();
    }
    drop(clocks);

    assert_eq!(messenger.subscription_count(), 5);
    assert_eq!(messenger.stats().live_subscriptions, 0);

    assert_eq!(messenger.purge(), 5);
    assert_eq!(messenger.subscription_count(), 0);
}

// --- Unregistration ---

#[test]
fn test_unregister_recipient_removes_everything() {
    let messenger = Messenger::new();
    let clock = Clock::new();
    let other = Clock::new();

    messenger.register(&clock, tick_action(&clock)).unwrap();
    messenger
        .register_with(
            &clock,
            RegisterOptions::new().token("night"),
            tick_action(&clock),
        )
        .unwrap();
    messenger
        .register(&clock, Action::<Tock>::new(|_| {}))
        .unwrap();
    messenger.register(&other, tick_action(&other)).unwrap();

    assert_eq!(messenger.unregister(&clock), 3);

    messenger.send(&Tick).unwrap();
    messenger.send_with_token(&Tick, "night").unwrap();
    assert_eq!(messenger.send(&Tock).unwrap(), 0);

    assert_eq!(clock.ticks(), 0);
    assert_eq!(other.ticks(), 1);
}

#[test]
fn test_unregister_type_keeps_other_types() {
    let messenger = Messenger::new();
    let clock = Clock::new();

    messenger.register(&clock, tick_action(&clock)).unwrap();
    messenger
        .register_with(&clock, RegisterOptions::new().token(1), tick_action(&clock))
        .unwrap();
    messenger
        .register(&clock, Action::<Tock>::new(|_| {}))
        .unwrap();

    assert_eq!(messenger.unregister_type::<Tick, _>(&clock), 2);
    assert_eq!(messenger.send(&Tick).unwrap(), 0);
    assert_eq!(messenger.send_with_token(&Tick, 1).unwrap(), 0);
    assert_eq!(messenger.send(&Tock).unwrap(), 1);
}

#[test]
fn test_unregister_token_keeps_other_channels() {
    let messenger = Messenger::new();
    let clock = Clock::new();

    messenger
        .register_with(&clock, RegisterOptions::new().token("a"), tick_action(&clock))
        .unwrap();
    messenger
        .register_with(&clock, RegisterOptions::new().token("b"), tick_action(&clock))
        .unwrap();
    messenger.register(&clock, tick_action(&clock)).unwrap();

    assert_eq!(messenger.unregister_token::<Tick, _>(&clock, "a"), 1);
    assert_eq!(messenger.send_with_token(&Tick, "a").unwrap(), 0);
    assert_eq!(messenger.send_with_token(&Tick, "b").unwrap(), 1);
    assert_eq!(messenger.send(&Tick).unwrap(), 1);
}

#[test]
fn test_equal_recipients_never_cross_cancel() {
    #[derive(PartialEq)]
    struct Same(u8);

    let messenger = Messenger::new();
    let first = Arc::new(Same(1));
    let second = Arc::new(Same(1));
    assert!(*first == *second);

    messenger.register(&first, Action::<Tick>::new(|_| {})).unwrap();
    messenger.register(&second, Action::<Tick>::new(|_| {})).unwrap();

    assert_eq!(messenger.unregister(&first), 1);
    assert_eq!(messenger.send(&Tick).unwrap(), 1);
}

#[test]
fn test_unregister_by_identity_after_drop() {
    let messenger = Messenger::new();
    let clock = Clock::new();
    let id = RecipientId::of(&clock);
    messenger
        .register_with(
            &clock,
            RegisterOptions::new().keep_alive(),
            tick_action(&clock),
        )
        .unwrap();

    // The strongly held target keeps the recipient alive, so only an
    // explicit unregister ends it.
    let witness = Arc::downgrade(&clock);
    drop(clock);
    assert!(witness.upgrade().is_some());

    assert_eq!(messenger.unregister_id(id), 1);
    assert!(witness.upgrade().is_none());
}
