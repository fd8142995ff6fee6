//! Multi-context change notification.
//!
//! Several contexts (this process, another process on the same data dir, an
//! admin panel on another host) need to converge on the same catalog data
//! without a dedicated push channel. Convergence is best-effort over three
//! redundant signal paths, each of which can fail independently:
//!
//! 1. an in-process broadcast channel, fired synchronously by [`ChangeNotifier::publish`]
//!    (the writer notifies itself explicitly — there is no implicit echo),
//! 2. a poll loop over the monotonic `last_update` key in the shared store,
//!    which repairs any missed signal on the next tick,
//! 3. an optional NATS subject for contexts that do not share the data dir.
//!
//! None of the paths guarantees delivery or ordering beyond last-write-wins
//! on the timestamp key; subscribers are expected to re-read state, not to
//! interpret the signal payload.

use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::storage::{keys, KvStore};
use crate::Result;
use std::sync::Arc;

const SYNC_SUBJECT: &str = "smm.catalog.sync";
const CHANNEL_CAPACITY: usize = 64;

/// Why a subscriber was woken. Purely informational.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncSignal {
    /// `publish()` ran in this process.
    LocalWrite,
    /// The poll loop saw the last-update key advance.
    PollTick,
    /// Another process announced a change over NATS.
    Remote,
    /// Manual reconciliation requested (`resync()`).
    Resync,
}

/// Injected pub/sub service with an explicit lifecycle. Construct once,
/// `start()` it, hand `Arc`s to the stores that publish or subscribe.
pub struct ChangeNotifier {
    kv: Arc<KvStore>,
    tx: broadcast::Sender<SyncSignal>,
    nats: Option<async_nats::Client>,
    poll_interval: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

pub struct Subscription {
    rx: broadcast::Receiver<SyncSignal>,
}

impl Subscription {
    /// Next signal, or `None` once the notifier is gone. A lagged receiver
    /// skips ahead: missing intermediate signals is fine since subscribers
    /// re-read full state anyway.
    pub async fn recv(&mut self) -> Option<SyncSignal> {
        loop {
            match self.rx.recv().await {
                Ok(signal) => return Some(signal),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl ChangeNotifier {
    pub fn new(kv: Arc<KvStore>, nats: Option<async_nats::Client>) -> Arc<Self> {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new(Self {
            kv,
            tx,
            nats,
            poll_interval: Duration::from_millis(100),
            tasks: Mutex::new(Vec::new()),
        })
    }

    #[cfg(test)]
    pub fn with_poll_interval(kv: Arc<KvStore>, interval: Duration) -> Arc<Self> {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new(Self {
            kv,
            tx,
            nats: None,
            poll_interval: interval,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Begin the poll loop (and the NATS listener when configured).
    /// Idempotent only in the sense that calling it twice just runs
    /// redundant pollers; callers are expected to start once.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().expect("notifier lock poisoned");

        let poller = Arc::clone(self);
        // Baseline before the task is spawned; a write landing between
        // start() and the first tick must still produce a signal.
        let mut last_seen = self.last_update();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poller.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let current = poller.last_update();
                if current > last_seen {
                    last_seen = current;
                    let _ = poller.tx.send(SyncSignal::PollTick);
                }
            }
        }));

        if let Some(client) = self.nats.clone() {
            let listener = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                let Ok(mut sub) = client.subscribe(SYNC_SUBJECT).await else {
                    tracing::warn!("sync subject unavailable, relying on polling only");
                    return;
                };
                while sub.next().await.is_some() {
                    let _ = listener.tx.send(SyncSignal::Remote);
                }
            }));
        }
    }

    /// Stop all background signal paths. Safe to call more than once.
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock().expect("notifier lock poisoned");
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    /// Announce that a writer persisted a change: advance the monotonic
    /// last-update key, wake in-process subscribers (including the writer's
    /// own context), and ping other processes best-effort.
    pub fn publish(&self) -> Result<()> {
        self.kv.with(|txn| {
            let prev: i64 = txn.get(keys::LAST_UPDATE)?.unwrap_or(0);
            let next = Utc::now().timestamp_millis().max(prev + 1);
            txn.put(keys::LAST_UPDATE, &next)
        })?;

        let _ = self.tx.send(SyncSignal::LocalWrite);

        if let Some(client) = self.nats.clone() {
            tokio::spawn(async move {
                if let Err(e) = client.publish(SYNC_SUBJECT, "update".into()).await {
                    tracing::warn!(error = %e, "sync broadcast failed");
                }
            });
        }
        Ok(())
    }

    /// Manual reconciliation entry point; the equivalent of a tab regaining
    /// focus. Wakes subscribers so they re-read persisted state.
    pub fn resync(&self) {
        let _ = self.tx.send(SyncSignal::Resync);
    }

    // Reload rather than get: an external process bumps the key through its
    // own cache, so only the file is authoritative here.
    fn last_update(&self) -> i64 {
        self.kv.reload(keys::LAST_UPDATE).ok().flatten().unwrap_or(0)
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn open_kv() -> (tempfile::TempDir, Arc<KvStore>) {
        let dir = tempfile::tempdir().unwrap();
        let kv = Arc::new(KvStore::open(dir.path()).unwrap());
        (dir, kv)
    }

    #[tokio::test]
    async fn test_publish_wakes_own_context() {
        let (_dir, kv) = open_kv();
        let notifier = ChangeNotifier::new(kv, None);
        let mut sub = notifier.subscribe();

        notifier.publish().unwrap();

        let signal = timeout(Duration::from_secs(1), sub.recv()).await.unwrap();
        assert_eq!(signal, Some(SyncSignal::LocalWrite));
    }

    #[tokio::test]
    async fn test_poll_detects_external_bump() {
        let (_dir, kv) = open_kv();
        let notifier = ChangeNotifier::with_poll_interval(Arc::clone(&kv), Duration::from_millis(10));
        notifier.start();
        let mut sub = notifier.subscribe();

        // An external writer bumps the key without going through publish().
        kv.put(keys::LAST_UPDATE, &i64::MAX).unwrap();

        let signal = timeout(Duration::from_secs(2), sub.recv()).await.unwrap();
        assert_eq!(signal, Some(SyncSignal::PollTick));
        notifier.stop();
    }

    #[tokio::test]
    async fn test_poll_sees_second_process_write() {
        let (dir, kv) = open_kv();
        let notifier = ChangeNotifier::with_poll_interval(Arc::clone(&kv), Duration::from_millis(10));
        notifier.start();
        let mut sub = notifier.subscribe();

        // A separate store over the same data dir, as a second process
        // would have; its write never touches the poller's cache.
        let other = KvStore::open(dir.path()).unwrap();
        other.put(keys::LAST_UPDATE, &i64::MAX).unwrap();

        let signal = timeout(Duration::from_secs(2), sub.recv()).await.unwrap();
        assert_eq!(signal, Some(SyncSignal::PollTick));
        notifier.stop();
    }

    #[tokio::test]
    async fn test_timestamp_is_monotonic() {
        let (_dir, kv) = open_kv();
        let notifier = ChangeNotifier::new(Arc::clone(&kv), None);

        notifier.publish().unwrap();
        let first: i64 = kv.get(keys::LAST_UPDATE).unwrap().unwrap();
        notifier.publish().unwrap();
        let second: i64 = kv.get(keys::LAST_UPDATE).unwrap().unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_resync_signal() {
        let (_dir, kv) = open_kv();
        let notifier = ChangeNotifier::new(kv, None);
        let mut sub = notifier.subscribe();

        notifier.resync();

        let signal = timeout(Duration::from_secs(1), sub.recv()).await.unwrap();
        assert_eq!(signal, Some(SyncSignal::Resync));
    }

    #[tokio::test]
    async fn test_subscriber_count_tracks_drops() {
        let (_dir, kv) = open_kv();
        let notifier = ChangeNotifier::new(kv, None);
        assert_eq!(notifier.subscriber_count(), 0);
        let sub = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 1);
        drop(sub);
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
