//! Authoritative now-playing state plus the set of live subscribers.
//!
//! Both live behind one lock so a mutation and its broadcast are a single
//! step for every other caller: nobody can observe an update whose broadcast
//! has not been queued, and queued broadcasts reach each subscriber in the
//! order the mutations happened. Each subscriber drains its own bounded
//! queue; a full or closed queue marks the subscriber dead.

use std::collections::HashMap;
use std::sync::Arc;

use globe_proto::likes::LikesStore;
use globe_proto::protocol::{LiveMessage, PlaybackState};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub type SubscriberId = u64;

/// Handle returned to a live connection. The first queued message is always
/// the state snapshot taken at subscription time.
pub struct Subscription {
    pub id: SubscriberId,
    pub rx: mpsc::Receiver<LiveMessage>,
}

struct HubInner {
    state: PlaybackState,
    subscribers: HashMap<SubscriberId, mpsc::Sender<LiveMessage>>,
    next_id: SubscriberId,
}

pub struct Hub {
    inner: RwLock<HubInner>,
    likes: Arc<dyn LikesStore>,
    queue_capacity: usize,
}

impl Hub {
    pub fn new(initial: PlaybackState, likes: Arc<dyn LikesStore>, queue_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(HubInner {
                state: initial,
                subscribers: HashMap::new(),
                next_id: 0,
            }),
            likes,
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Current state with `liked` looked up fresh.
    pub async fn snapshot(&self) -> PlaybackState {
        let inner = self.inner.read().await;
        self.with_liked(&inner.state)
    }

    pub async fn subscribe(&self) -> Subscription {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let state = self.with_liked(&inner.state);
        // Fresh queue with capacity >= 1, cannot be full.
        let _ = tx.try_send(LiveMessage::State { state });
        inner.subscribers.insert(id, tx);

        debug!("Subscriber {} joined ({} live)", id, inner.subscribers.len());
        Subscription { id, rx }
    }

    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner.subscribers.remove(&id).is_some();
        if removed {
            debug!("Subscriber {} left ({} live)", id, inner.subscribers.len());
        }
        removed
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.read().await.subscribers.len()
    }

    /// Applies `apply` to the state and broadcasts the result.
    pub async fn update<F>(&self, apply: F) -> PlaybackState
    where
        F: FnOnce(&mut PlaybackState),
    {
        let mut inner = self.inner.write().await;
        apply(&mut inner.state);
        self.commit(&mut inner)
    }

    /// Runs `apply` under the lock; when it returns true the revision is
    /// bumped and the new state broadcast. `apply` must not touch the state
    /// when it returns false.
    pub async fn update_if<F>(&self, apply: F) -> Option<PlaybackState>
    where
        F: FnOnce(&mut PlaybackState) -> bool,
    {
        let mut inner = self.inner.write().await;
        if !apply(&mut inner.state) {
            return None;
        }
        Some(self.commit(&mut inner))
    }

    fn commit(&self, inner: &mut HubInner) -> PlaybackState {
        inner.state.rev += 1;
        inner.state.liked = self.likes.is_liked(&inner.state.track_id);

        let state = inner.state.clone();
        let delivered = inner.broadcast(&state);
        debug!("State rev {} pushed to {} subscribers", state.rev, delivered);
        state
    }

    fn with_liked(&self, state: &PlaybackState) -> PlaybackState {
        let mut state = state.clone();
        state.liked = self.likes.is_liked(&state.track_id);
        state
    }
}

impl HubInner {
    /// Queues `state` for every subscriber, then sweeps out the ones that
    /// failed. Returns the number of deliveries.
    fn broadcast(&mut self, state: &PlaybackState) -> usize {
        let msg = LiveMessage::State {
            state: state.clone(),
        };
        let mut dead = Vec::new();
        let mut delivered = 0;

        for (id, tx) in self.subscribers.iter() {
            match tx.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Subscriber {} is not keeping up, dropping it", id);
                    dead.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Subscriber {} is gone", id);
                    dead.push(*id);
                }
            }
        }

        for id in dead {
            self.subscribers.remove(&id);
        }
        delivered
    }
}
