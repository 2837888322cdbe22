//! # Channel-based bus with back-pressure.
//!
//! [`ChannelBus`] hands each subscriber its own bounded `mpsc` receiver. `emit()`
//! awaits until the value has been accepted by every subscriber's queue, so a slow
//! consumer slows the emitter down instead of losing values.
//!
//! ```text
//! emit(v) ──► [queue S1] (await send) ──► rx S1
//!         ──► [queue S2] (await send) ──► rx S2
//!         ──► [queue SN] (await send) ──► rx SN
//! ```
//!
//! ## Rules
//! - Every subscriber receives every value emitted between its subscribe and its
//!   unsubscribe; nothing is dropped or duplicated.
//! - Dropping a receiver unsubscribes it on the next emission.
//! - `close()` drops every sender; receivers then drain and observe `None`.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::error::RuntimeError;
use crate::events::pubsub::{Token, TokenSource};

struct Subscriber<T> {
    token: Token,
    tx: mpsc::Sender<T>,
}

struct State<T> {
    closed: bool,
    subs: Vec<Subscriber<T>>,
}

/// Multi-subscriber bus delivering through bounded channels.
pub struct ChannelBus<T> {
    state: Mutex<State<T>>,
    tokens: TokenSource,
    capacity: usize,
}

impl<T: Clone + Send + 'static> ChannelBus<T> {
    /// Creates a bus whose subscribers buffer at most `capacity` values (min 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                closed: false,
                subs: Vec::new(),
            }),
            tokens: TokenSource::new(),
            capacity: capacity.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Registers a subscriber and returns its token and receive-only channel.
    pub fn subscribe(&self) -> Result<(Token, mpsc::Receiver<T>), RuntimeError> {
        let mut state = self.state();
        if state.closed {
            return Err(RuntimeError::out_of_order("subscribe on a closed bus"));
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        let token = self.tokens.next();
        state.subs.push(Subscriber { token, tx });
        Ok((token, rx))
    }

    /// Removes the subscriber bearing `token`; its receiver then drains and closes.
    pub fn unsubscribe(&self, token: Token) {
        self.state().subs.retain(|s| s.token != token);
    }

    /// Sends `value` to every subscriber, awaiting room in each queue.
    pub async fn emit(&self, value: T) -> Result<(), RuntimeError> {
        let targets: Vec<(Token, mpsc::Sender<T>)> = {
            let state = self.state();
            if state.closed {
                return Err(RuntimeError::out_of_order("emit on a closed bus"));
            }
            state
                .subs
                .iter()
                .map(|s| (s.token, s.tx.clone()))
                .collect()
        };

        let mut gone = Vec::new();
        for (token, tx) in targets {
            if tx.send(value.clone()).await.is_err() {
                gone.push(token);
            }
        }
        if !gone.is_empty() {
            log::debug!("channel bus pruned {} closed subscriber(s)", gone.len());
            self.state().subs.retain(|s| !gone.contains(&s.token));
        }
        Ok(())
    }

    /// Terminates the bus and drops every sender. Idempotent.
    pub fn close(&self) {
        let subs = {
            let mut state = self.state();
            state.closed = true;
            std::mem::take(&mut state.subs)
        };
        drop(subs);
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.state().subs.len()
    }

    /// True if there are no subscribers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> std::fmt::Debug for ChannelBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f.debug_struct("ChannelBus")
            .field("closed", &state.closed)
            .field("subscribers", &state.subs.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn every_subscriber_gets_every_value() {
        let bus = Arc::new(ChannelBus::<u32>::new(1));
        let (_, a) = bus.subscribe().unwrap();
        let (_, mut b) = bus.subscribe().unwrap();

        let emitter = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move {
                for i in 0..20 {
                    bus.emit(i).await.unwrap();
                }
                bus.close();
            })
        };

        let reader = |mut rx: mpsc::Receiver<u32>| async move {
            let mut got = Vec::new();
            while let Some(v) = rx.recv().await {
                got.push(v);
            }
            got
        };
        let (got_a, got_b) = tokio::join!(reader(a), async {
            // slow consumer applies back-pressure, nothing is lost
            let mut got = Vec::new();
            while let Some(v) = b.recv().await {
                tokio::time::sleep(Duration::from_millis(1)).await;
                got.push(v);
            }
            got
        });
        emitter.await.unwrap();

        let expected: Vec<u32> = (0..20).collect();
        assert_eq!(got_a, expected);
        assert_eq!(got_b, expected);
    }

    #[tokio::test]
    async fn emit_blocks_until_room() {
        let bus = ChannelBus::<u32>::new(1);
        let (_, mut rx) = bus.subscribe().unwrap();
        bus.emit(1).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(20), bus.emit(2)).await;
        assert!(blocked.is_err());

        assert_eq!(rx.recv().await, Some(1));
        bus.emit(3).await.unwrap();
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned() {
        let bus = ChannelBus::<u32>::new(4);
        let (_, rx) = bus.subscribe().unwrap();
        let (token, mut keep) = bus.subscribe().unwrap();
        drop(rx);

        bus.emit(7).await.unwrap();
        assert_eq!(bus.len(), 1);
        assert_eq!(keep.recv().await, Some(7));

        bus.unsubscribe(token);
        bus.unsubscribe(token);
        assert!(bus.is_empty());
        assert_eq!(keep.recv().await, None);
    }

    #[tokio::test]
    async fn closed_bus_rejects_work() {
        let bus = ChannelBus::<u32>::new(1);
        bus.close();
        assert!(matches!(
            bus.emit(1).await,
            Err(RuntimeError::OutOfOrder { .. })
        ));
        assert!(bus.subscribe().is_err());
    }
}
