//! # Callback-based publish/subscribe bus.
//!
//! [`PubSub`] delivers values to callbacks registered on small integer queues.
//!
//! ## Architecture
//! ```text
//! Emitters (many):                           Subscribers (per queue):
//!   timer worker ──┐                           ┌──► callback #1 (token 1)
//!   unit A       ──┼── emit(queue, value) ─────┼──► callback #2 (token 4)
//!   task N       ──┘   (caller's thread)       └──► callback #3 (token 9)
//! ```
//!
//! ## Rules
//! - **Synchronous delivery**: `emit()` calls every current subscriber of the queue
//!   in subscription order on the caller's thread, then returns.
//! - **Per-queue total order**: emissions on one queue are serialised; emissions on
//!   different queues may run concurrently.
//! - **Panic isolation**: a panicking callback is logged and reported as
//!   [`RuntimeError::Internal`]; later callbacks still run.
//! - **Tokens**: non-zero, strictly increasing, never reused. Unsubscribe is idempotent.
//! - **Close**: drops every subscription; subscribe and emit then fail with
//!   [`RuntimeError::OutOfOrder`].
//!
//! Callbacks may subscribe or unsubscribe on *other* queues while being called.
//! Changes to the queue being emitted take effect from the next emission.
//!
//! A callback may emit on the queue it is being called for. The nested value is
//! queued and returns at once; the outer `emit()` delivers it right after the
//! current value and reports its callback failures as its own.
//!
//! ## Example
//! ```
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//! use unitvisor::PubSub;
//!
//! let bus: PubSub<u32> = PubSub::new();
//! let sum = Arc::new(AtomicUsize::new(0));
//! let s = Arc::clone(&sum);
//! let token = bus.subscribe(1, move |v: &u32| { s.fetch_add(*v as usize, Ordering::SeqCst); }).unwrap();
//!
//! bus.emit(1, 5).unwrap();
//! bus.emit(2, 100).unwrap(); // nobody listens on queue 2
//! bus.unsubscribe(token);
//! bus.emit(1, 5).unwrap();
//!
//! assert_eq!(sum.load(Ordering::SeqCst), 5);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use crate::error::{CompoundError, RuntimeError};
use crate::units::Unit;

/// Queue identifier: a small non-negative integer namespace.
pub type QueueId = u32;

/// Opaque subscription token. Non-zero and unique for the bus's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(NonZeroU64);

impl Token {
    /// Numeric value of the token.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic token source shared by the bus variants.
#[derive(Debug)]
pub(crate) struct TokenSource(AtomicU64);

impl TokenSource {
    pub(crate) fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub(crate) fn next(&self) -> Token {
        let n = self.0.fetch_add(1, Ordering::Relaxed);
        // starts at 1 and only grows
        Token(NonZeroU64::new(n).unwrap_or(NonZeroU64::MIN))
    }
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Subscription<T> {
    token: Token,
    callback: Callback<T>,
}

/// Delivery role of a queue: the emitting thread and values queued behind it.
struct Delivery<T> {
    owner: Option<ThreadId>,
    pending: VecDeque<T>,
}

struct Queue<T> {
    delivery: Mutex<Delivery<T>>,
    idle: Condvar,
    subs: Mutex<Vec<Subscription<T>>>,
}

impl<T> Queue<T> {
    fn new() -> Self {
        Self {
            delivery: Mutex::new(Delivery {
                owner: None,
                pending: VecDeque::new(),
            }),
            idle: Condvar::new(),
            subs: Mutex::new(Vec::new()),
        }
    }

    fn delivery(&self) -> MutexGuard<'_, Delivery<T>> {
        self.delivery.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn subs(&self) -> MutexGuard<'_, Vec<Subscription<T>>> {
        self.subs.lock().unwrap_or_else(|p| p.into_inner())
    }
}

struct Table<T> {
    closed: bool,
    queues: HashMap<QueueId, Arc<Queue<T>>>,
}

/// Typed, multi-subscriber, in-process event bus with synchronous delivery.
pub struct PubSub<T> {
    table: Mutex<Table<T>>,
    tokens: TokenSource,
}

impl<T> Default for PubSub<T> {
    fn default() -> Self {
        Self {
            table: Mutex::new(Table {
                closed: false,
                queues: HashMap::new(),
            }),
            tokens: TokenSource::new(),
        }
    }
}

impl<T> PubSub<T> {
    /// Creates an empty, open bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, Table<T>> {
        self.table.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Registers `callback` on `queue` and returns its token.
    ///
    /// The queue is created on first use.
    pub fn subscribe<F>(&self, queue: QueueId, callback: F) -> Result<Token, RuntimeError>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut table = self.table();
        if table.closed {
            return Err(RuntimeError::out_of_order("subscribe on a closed bus"));
        }
        let token = self.tokens.next();
        let q = table
            .queues
            .entry(queue)
            .or_insert_with(|| Arc::new(Queue::new()));
        q.subs().push(Subscription {
            token,
            callback: Arc::new(callback),
        });
        log::trace!("subscribe queue={queue} token={token}");
        Ok(token)
    }

    /// Removes the subscription bearing `token`, in whichever queue it lives.
    ///
    /// Unknown tokens and a closed bus are silently accepted.
    pub fn unsubscribe(&self, token: Token) {
        let table = self.table();
        for (queue, q) in table.queues.iter() {
            let mut subs = q.subs();
            if let Some(pos) = subs.iter().position(|s| s.token == token) {
                subs.remove(pos);
                log::trace!("unsubscribe queue={queue} token={token}");
                return;
            }
        }
    }

    /// Delivers `value` to every current subscriber of `queue`, in subscription order.
    ///
    /// Returns after every callback has run, including values emitted on `queue`
    /// by those callbacks. Panicking callbacks are reported as
    /// [`RuntimeError::Internal`] (several panics as a compound); the remaining
    /// callbacks still receive the value.
    pub fn emit(&self, queue: QueueId, value: T) -> Result<(), RuntimeError> {
        let q = {
            let table = self.table();
            if table.closed {
                return Err(RuntimeError::out_of_order("emit on a closed bus"));
            }
            match table.queues.get(&queue) {
                Some(q) => Arc::clone(q),
                None => return Ok(()),
            }
        };

        let me = thread::current().id();
        {
            let mut d = q.delivery();
            if d.owner == Some(me) {
                // Re-entrant emit from a callback: the running delivery loop picks it up.
                d.pending.push_back(value);
                return Ok(());
            }
            while d.owner.is_some() {
                d = q.idle.wait(d).unwrap_or_else(|p| p.into_inner());
            }
            d.owner = Some(me);
        }

        let mut errors = CompoundError::new();
        let mut next = Some(value);
        while let Some(value) = next {
            Self::deliver(&q, queue, &value, &mut errors);
            let mut d = q.delivery();
            next = d.pending.pop_front();
            if next.is_none() {
                d.owner = None;
            }
        }
        q.idle.notify_all();
        errors.into_result()
    }

    fn deliver(q: &Queue<T>, queue: QueueId, value: &T, errors: &mut CompoundError) {
        let snapshot: Vec<(Token, Callback<T>)> = q
            .subs()
            .iter()
            .map(|s| (s.token, Arc::clone(&s.callback)))
            .collect();

        for (token, callback) in snapshot {
            if let Err(panic_err) = catch_unwind(AssertUnwindSafe(|| callback(value))) {
                let info = panic_message(&*panic_err);
                log::error!("bus callback panicked: queue={queue} token={token}: {info}");
                errors.push(RuntimeError::internal(format!(
                    "callback {token} on queue {queue} panicked: {info}"
                )));
            }
        }
    }

    /// Marks the bus terminated and drops every subscription. Idempotent.
    pub fn close(&self) {
        let queues = {
            let mut table = self.table();
            table.closed = true;
            std::mem::take(&mut table.queues)
        };
        // Callbacks are dropped outside the table lock.
        drop(queues);
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.table().closed
    }

    /// Number of live subscriptions across all queues.
    pub fn len(&self) -> usize {
        self.table().queues.values().map(|q| q.subs().len()).sum()
    }

    /// True if there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> fmt::Debug for PubSub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table();
        let mut queues: Vec<_> = table
            .queues
            .iter()
            .map(|(id, q)| (*id, q.subs().len()))
            .collect();
        queues.sort_unstable();
        f.debug_struct("PubSub")
            .field("closed", &table.closed)
            .field("queues", &queues)
            .finish()
    }
}

impl<T: Send + 'static> Unit for PubSub<T> {
    fn close(&self) -> Result<(), crate::UnitError> {
        PubSub::close(self);
        Ok(())
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter(bus: &PubSub<u32>, queue: QueueId) -> (Token, Arc<AtomicUsize>) {
        let n = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&n);
        let token = bus
            .subscribe(queue, move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        (token, n)
    }

    #[test]
    fn tokens_are_nonzero_and_increasing() {
        let bus: PubSub<u32> = PubSub::new();
        let a = bus.subscribe(0, |_| {}).unwrap();
        let b = bus.subscribe(7, |_| {}).unwrap();
        let c = bus.subscribe(0, |_| {}).unwrap();
        assert!(a.get() > 0);
        assert!(a < b && b < c);
    }

    #[test]
    fn delivery_follows_subscription_order() {
        let bus: PubSub<u32> = PubSub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for id in 0..3 {
            let seen = Arc::clone(&seen);
            bus.subscribe(4, move |v: &u32| seen.lock().unwrap().push((id, *v)))
                .unwrap();
        }
        bus.emit(4, 10).unwrap();
        bus.emit(4, 11).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            [(0, 10), (1, 10), (2, 10), (0, 11), (1, 11), (2, 11)]
        );
    }

    #[test]
    fn queues_are_isolated() {
        let bus: PubSub<u32> = PubSub::new();
        let (_, one) = counter(&bus, 1);
        let (_, two) = counter(&bus, 2);
        bus.emit(1, 0).unwrap();
        bus.emit(1, 0).unwrap();
        bus.emit(2, 0).unwrap();
        assert_eq!(one.load(Ordering::SeqCst), 2);
        assert_eq!(two.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_unknown_token_is_harmless() {
        let bus: PubSub<u32> = PubSub::new();
        let (token, n) = counter(&bus, 1);
        let other: PubSub<u32> = PubSub::new();
        let foreign = other.subscribe(1, |_| {}).unwrap();
        let foreign = Token(NonZeroU64::new(foreign.get() + 100).unwrap());

        bus.unsubscribe(foreign);
        bus.emit(1, 0).unwrap();
        assert_eq!(n.load(Ordering::SeqCst), 1);

        bus.unsubscribe(token);
        bus.unsubscribe(token);
        bus.emit(1, 0).unwrap();
        assert_eq!(n.load(Ordering::SeqCst), 1);
        assert!(bus.is_empty());
    }

    #[test]
    fn panicking_callback_does_not_silence_others() {
        let bus: PubSub<u32> = PubSub::new();
        let (_, before) = counter(&bus, 3);
        bus.subscribe(3, |_| panic!("boom")).unwrap();
        let (_, after) = counter(&bus, 3);

        let res = bus.emit(3, 1);
        assert!(matches!(res, Err(RuntimeError::Internal { .. })));
        assert_eq!(before.load(Ordering::SeqCst), 1);
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_use_other_queues() {
        let bus: Arc<PubSub<u32>> = Arc::new(PubSub::new());
        let (_, relayed) = counter(&bus, 2);
        let b = Arc::clone(&bus);
        bus.subscribe(1, move |v| {
            b.emit(2, *v).unwrap();
        })
        .unwrap();
        bus.emit(1, 9).unwrap();
        assert_eq!(relayed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_emit_on_its_own_queue() {
        let bus: Arc<PubSub<u32>> = Arc::new(PubSub::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let b = Arc::clone(&bus);
        let s = Arc::clone(&seen);
        bus.subscribe(0, move |v: &u32| {
            s.lock().unwrap().push(*v);
            if *v == 1 {
                b.emit(0, 2).unwrap();
                b.emit(0, 3).unwrap();
            }
        })
        .unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let outer = Arc::clone(&bus);
        std::thread::spawn(move || {
            let _ = tx.send(outer.emit(0, 1));
        });
        let res = rx
            .recv_timeout(std::time::Duration::from_secs(2))
            .expect("nested emit deadlocked");
        assert!(res.is_ok());
        assert_eq!(*seen.lock().unwrap(), [1, 2, 3]);

        bus.emit(0, 4).unwrap();
        assert_eq!(*seen.lock().unwrap(), [1, 2, 3, 4]);
    }

    #[test]
    fn nested_panics_surface_on_the_outer_emit() {
        let bus: Arc<PubSub<u32>> = Arc::new(PubSub::new());
        let b = Arc::clone(&bus);
        bus.subscribe(0, move |v: &u32| {
            if *v == 0 {
                b.emit(0, 1).unwrap();
            } else {
                panic!("second value");
            }
        })
        .unwrap();
        assert!(matches!(bus.emit(0, 0), Err(RuntimeError::Internal { .. })));
    }

    #[test]
    fn closed_bus_rejects_work() {
        let bus: PubSub<u32> = PubSub::new();
        let (token, _) = counter(&bus, 1);
        bus.close();
        bus.close();
        assert!(bus.is_closed());
        assert!(bus.is_empty());
        assert!(matches!(
            bus.emit(1, 0),
            Err(RuntimeError::OutOfOrder { .. })
        ));
        assert!(matches!(
            bus.subscribe(1, |_| {}),
            Err(RuntimeError::OutOfOrder { .. })
        ));
        bus.unsubscribe(token);
    }

    #[test]
    fn concurrent_emitters_on_one_queue_are_serialised() {
        let bus: Arc<PubSub<u32>> = Arc::new(PubSub::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));
        {
            let inside = Arc::clone(&inside);
            let overlap = Arc::clone(&overlap);
            bus.subscribe(0, move |_| {
                if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlap.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::yield_now();
                inside.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let bus = Arc::clone(&bus);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        bus.emit(0, i).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(overlap.load(Ordering::SeqCst), 0);
    }
}
