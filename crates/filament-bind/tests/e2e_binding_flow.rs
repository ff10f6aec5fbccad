//! End-to-end binding flow over the queued (UI-mode) dispatch path.
//!
//! Exercises the full pipeline: tracked domain mutation, staleness chaining
//! from field sentry through property wrapper to the proxy's aggregate
//! node, deferred refresh on pump, and property-changed delivery. Includes
//! the cross-thread invalidation path and disposal racing a scheduled
//! refresh.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use filament_bind::{
    Bindable, DispatchContext, ObjectProxy, PropertyDescriptor, TrackingContext, boxed, downcast,
};
use filament_reactive::Tracked;

struct Account {
    owner: Tracked<String>,
    balance: Tracked<i64>,
    /// Live feed readable from any thread; changes are announced via
    /// remote invalidation signals rather than sentries.
    quote: Arc<AtomicI64>,
    owner_evals: Cell<u32>,
    balance_evals: Cell<u32>,
}

impl Account {
    fn new(owner: &str, balance: i64) -> Rc<Self> {
        Rc::new(Account {
            owner: Tracked::new(owner.to_string()),
            balance: Tracked::new(balance),
            quote: Arc::new(AtomicI64::new(0)),
            owner_evals: Cell::new(0),
            balance_evals: Cell::new(0),
        })
    }
}

impl Bindable for Account {
    fn descriptors() -> Vec<PropertyDescriptor<Self>> {
        vec![
            PropertyDescriptor {
                name: "owner",
                get: |a| {
                    a.owner_evals.set(a.owner_evals.get() + 1);
                    boxed(a.owner.get())
                },
            },
            PropertyDescriptor {
                name: "balance",
                get: |a| {
                    a.balance_evals.set(a.balance_evals.get() + 1);
                    boxed(a.balance.get())
                },
            },
            PropertyDescriptor {
                name: "quote",
                get: |a| boxed(a.quote.load(Ordering::Acquire)),
            },
        ]
    }
}

#[test]
fn invalidations_collapse_into_one_scheduled_refresh() {
    let dispatch = DispatchContext::ui_mode();
    let context = TrackingContext::new(dispatch.clone());
    let account = Account::new("ada", 10);
    let proxy = ObjectProxy::new(Rc::clone(&account), context).unwrap();

    proxy.refresh();
    assert_eq!(account.balance_evals.get(), 1);
    assert_eq!(account.owner_evals.get(), 1);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = Rc::clone(&seen);
    let _sub = proxy.on_property_changed(move |change| {
        let v = *downcast::<i64>(&change.value).unwrap();
        seen_clone.borrow_mut().push((change.name, v));
    });

    // Two invalidations before the scheduled re-run executes.
    account.balance.set(20);
    account.balance.set(25);
    assert_eq!(account.balance_evals.get(), 1, "no refresh before pump");

    dispatch.pump();

    // Exactly one aggregate re-run, observing the latest state; the
    // untouched property did not re-evaluate.
    assert_eq!(account.balance_evals.get(), 2);
    assert_eq!(account.owner_evals.get(), 1);
    assert_eq!(*seen.borrow(), vec![("balance", 25)]);

    // Nothing further pending.
    assert_eq!(dispatch.pump(), 0);
}

#[test]
fn background_thread_invalidation_reaches_the_owning_thread() {
    let dispatch = DispatchContext::ui_mode();
    let context = TrackingContext::new(dispatch.clone());
    let account = Account::new("ada", 10);
    let proxy = ObjectProxy::new(Rc::clone(&account), context).unwrap();
    proxy.refresh();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = Rc::clone(&seen);
    let _sub = proxy.on_property_changed(move |change| {
        let v = *downcast::<i64>(&change.value).unwrap();
        seen_clone.borrow_mut().push((change.name, v));
    });

    let signal = proxy.remote_signal();
    let quote = Arc::clone(&account.quote);
    let worker = std::thread::spawn(move || {
        quote.store(42, Ordering::Release);
        signal.signal();
        // A second signal in the same episode collapses.
        signal.signal();
    });
    worker.join().expect("worker panicked");

    dispatch.pump();
    assert_eq!(*seen.borrow(), vec![("quote", 42)]);

    let wrapper = proxy.lookup_by_name("quote").unwrap();
    let value = wrapper.value().unwrap();
    assert_eq!(downcast::<i64>(&value), Some(&42));
}

#[test]
fn disposal_turns_scheduled_refresh_into_noop() {
    let dispatch = DispatchContext::ui_mode();
    let context = TrackingContext::new(dispatch.clone());
    let account = Account::new("ada", 10);
    let proxy = ObjectProxy::new(Rc::clone(&account), context).unwrap();
    proxy.refresh();

    let fired = Rc::new(Cell::new(0u32));
    let fired_clone = Rc::clone(&fired);
    let _sub = proxy.on_property_changed(move |_| fired_clone.set(fired_clone.get() + 1));

    // Invalidate, then dispose before the scheduled refresh runs.
    account.balance.set(99);
    proxy.dispose();
    dispatch.pump();

    assert!(proxy.is_disposed());
    assert_eq!(fired.get(), 0);
    assert_eq!(account.balance_evals.get(), 1);
}

#[test]
fn remote_signal_after_dispose_registers_nothing() {
    let dispatch = DispatchContext::ui_mode();
    let context = TrackingContext::new(dispatch.clone());
    let account = Account::new("ada", 1);
    let proxy = ObjectProxy::new(Rc::clone(&account), context).unwrap();
    proxy.refresh();
    proxy.dispose();

    let signal = proxy.remote_signal();
    let worker = std::thread::spawn(move || {
        signal.signal();
        signal.signal();
    });
    worker.join().expect("worker panicked");

    // No waker was registered and no token posted: nothing to execute.
    assert_eq!(dispatch.pump(), 0);
    assert_eq!(account.balance_evals.get(), 1);
}

#[test]
fn deferred_actions_run_fifo_after_pump() {
    let dispatch = DispatchContext::ui_mode();
    let context = TrackingContext::new(dispatch.clone());
    let proxy = ObjectProxy::new(Account::new("ada", 0), context).unwrap();

    let log = Rc::new(RefCell::new(Vec::new()));
    let first = Rc::clone(&log);
    proxy.defer(move || first.borrow_mut().push(1));
    let second = Rc::clone(&log);
    proxy.defer(move || second.borrow_mut().push(2));

    assert!(log.borrow().is_empty(), "fire-and-forget: nothing ran yet");
    dispatch.pump();
    assert_eq!(*log.borrow(), vec![1, 2]);
}

#[test]
fn binding_reads_stay_consistent_across_episodes() {
    let dispatch = DispatchContext::ui_mode();
    let context = TrackingContext::new(dispatch.clone());
    let account = Account::new("ada", 1);
    let proxy = ObjectProxy::new(Rc::clone(&account), context).unwrap();

    for balance in [5i64, -3, 0, 1000] {
        account.balance.set(balance);
        dispatch.pump();
        let wrapper = proxy.lookup_by_name("balance").unwrap();
        let value = wrapper.value().unwrap();
        assert_eq!(downcast::<i64>(&value), Some(&balance));
    }

    account.owner.set("grace".to_string());
    dispatch.pump();
    let owner = proxy.lookup_by_name("owner").unwrap().value().unwrap();
    assert_eq!(downcast::<String>(&owner), Some(&"grace".to_string()));
}
