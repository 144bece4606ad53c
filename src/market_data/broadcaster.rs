use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use crate::engine::{Exchange, MarketSnapshot};

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

pub type SubscriptionId = u64;

/// Receiving end of one subscriber's delivery queue.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    updates: mpsc::Receiver<MarketSnapshot>,
}

impl Subscription {
    /// Next snapshot, or `None` once the subscription has been cancelled.
    pub async fn recv(&mut self) -> Option<MarketSnapshot> {
        self.updates.recv().await
    }

    pub fn try_recv(&mut self) -> Option<MarketSnapshot> {
        self.updates.try_recv().ok()
    }
}

struct Inner {
    exchange: Exchange,
    interval: Duration,
    capacity: usize,
    next_id: AtomicU64,
    dropped: AtomicU64,
    // cancel signal per live delivery task
    subscribers: Mutex<AHashMap<SubscriptionId, oneshot::Sender<()>>>,
}

/// Pushes market snapshots to every subscriber on a fixed period.
///
/// Each subscriber gets its own delivery task and bounded queue; a full queue loses that
/// tick's snapshot rather than stalling anyone else.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Broadcaster {
    pub fn new(exchange: Exchange, interval: Duration, capacity: usize) -> Self {
        Broadcaster {
            inner: Arc::new(Inner {
                exchange,
                interval: interval.max(Duration::from_millis(1)),
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                dropped: AtomicU64::new(0),
                subscribers: Mutex::new(AHashMap::new()),
            }),
        }
    }

    /// Register a subscriber. The first snapshot is delivered straight away.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.inner.subscribers.lock().insert(id, cancel_tx);

        tokio::spawn(deliver(self.inner.clone(), id, tx, cancel_rx));
        info!(id, "Subscriber added");
        Subscription { id, updates: rx }
    }

    /// Cancel a subscription. Its queue is closed once the delivery task exits.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.inner.subscribers.lock().remove(&id) {
            Some(cancel) => {
                let _ = cancel.send(());
                info!(id, "Subscriber removed");
                true
            }
            None => false,
        }
    }

    pub fn shutdown(&self) {
        let cancels: Vec<_> = self.inner.subscribers.lock().drain().collect();
        for (_, cancel) in cancels.into_iter() {
            let _ = cancel.send(());
        }
        info!("Broadcaster shut down");
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Snapshots lost to full subscriber queues since start.
    pub fn dropped_updates(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

async fn deliver(
    inner: Arc<Inner>,
    id: SubscriptionId,
    tx: mpsc::Sender<MarketSnapshot>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(inner.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut cancel_rx => break,
            _ = ticker.tick() => {
                let snapshot = inner.exchange.snapshot();
                trace!(id, instruments = snapshot.instruments.len(), "Snapshot taken");
                match tx.try_send(snapshot) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        inner.dropped.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!("exsim_broadcast_dropped_total").increment(1);
                        debug!(id, "Subscriber queue full, dropping update");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(id, "Subscriber went away");
                        inner.subscribers.lock().remove(&id);
                        break;
                    }
                }
            }
        }
    }
    // dropping `tx` here is what ends the subscriber's stream
}
