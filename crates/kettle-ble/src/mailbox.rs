//! Notification mailbox
//!
//! Correlates notification frames pushed from the transport's delivery path
//! with protocol steps waiting for them. Frames are queued per characteristic
//! and consumed front-first. Status frames only replace a cached latest value.
//!
//! Every arrival bumps a per-characteristic counter and wakes waiters through a
//! [`Notify`], so a waiter that registered before the push always observes it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, trace};
use uuid::Uuid;

use kettle_core::characteristic_name;

/// One sub-wait of the bounded polling in [`Mailbox::wait_and_drain`]
pub const SUB_WAIT: Duration = Duration::from_millis(500);
/// Sub-waits attempted while the queue is empty
pub const SUB_WAIT_ATTEMPTS: usize = 3;

#[derive(Default)]
struct Channel {
    frames: VecDeque<Vec<u8>>,
    arrivals: u64,
    notify: Arc<Notify>,
}

#[derive(Default)]
struct MailboxState {
    channels: HashMap<Uuid, Channel>,
    latest: HashMap<Uuid, Vec<u8>>,
    /// Bumped on clear so waits in flight resolve as timed out
    epoch: u64,
}

impl MailboxState {
    fn channel(&mut self, characteristic: Uuid) -> &mut Channel {
        self.channels.entry(characteristic).or_default()
    }
}

/// Per-characteristic frame queues with waiter wake-up
#[derive(Default)]
pub struct Mailbox {
    state: Mutex<MailboxState>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame and wake waiters on that characteristic
    pub fn push(&self, characteristic: Uuid, frame: Vec<u8>) {
        let notify = {
            let mut state = self.lock();
            let channel = state.channel(characteristic);
            channel.frames.push_back(frame);
            channel.arrivals += 1;
            channel.notify.clone()
        };
        notify.notify_waiters();
    }

    /// Replace the cached latest frame and wake waiters on that characteristic
    pub fn store_latest(&self, characteristic: Uuid, frame: Vec<u8>) {
        let notify = {
            let mut state = self.lock();
            state.latest.insert(characteristic, frame);
            let channel = state.channel(characteristic);
            channel.arrivals += 1;
            channel.notify.clone()
        };
        notify.notify_waiters();
    }

    /// Most recent cached frame for a latest-value characteristic
    pub fn latest(&self, characteristic: Uuid) -> Option<Vec<u8>> {
        self.lock().latest.get(&characteristic).cloned()
    }

    pub fn is_empty(&self, characteristic: Uuid) -> bool {
        self.lock()
            .channels
            .get(&characteristic)
            .map_or(true, |channel| channel.frames.is_empty())
    }

    /// Wait for the next frame on `characteristic`
    ///
    /// Resolves true when a frame arrives after the call, false on timeout or
    /// when the mailbox is cleared. Each call is a fresh single-shot wait.
    pub async fn wait_for_signal(&self, characteristic: Uuid, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        let (notify, seen, epoch) = {
            let mut state = self.lock();
            let epoch = state.epoch;
            let channel = state.channel(characteristic);
            (channel.notify.clone(), channel.arrivals, epoch)
        };

        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = self.signal_state(characteristic, seen, epoch) {
                return outcome;
            }

            if timeout_at(deadline, notified).await.is_err() {
                trace!(
                    characteristic = characteristic_name(&characteristic),
                    "Notification wait timed out"
                );
                return false;
            }
        }
    }

    /// `Some(true)` once a frame arrived, `Some(false)` after a clear
    fn signal_state(&self, characteristic: Uuid, seen: u64, epoch: u64) -> Option<bool> {
        let state = self.lock();
        if state.epoch != epoch {
            return Some(false);
        }
        let arrivals = state
            .channels
            .get(&characteristic)
            .map_or(0, |channel| channel.arrivals);
        (arrivals > seen).then_some(true)
    }

    /// Wait briefly for frames, then drain one or all of them in arrival order
    ///
    /// Polls up to three 500 ms sub-waits while the queue is empty. When
    /// `extra` is non-zero, sleeps that long and waits one more sub-wait so
    /// trailing fragments can land. Returns an empty vector if nothing came.
    pub async fn wait_and_drain(
        &self,
        characteristic: Uuid,
        extra: Duration,
        single: bool,
    ) -> Vec<Vec<u8>> {
        for _ in 0..SUB_WAIT_ATTEMPTS {
            if !self.is_empty(characteristic) {
                break;
            }
            self.wait_for_signal(characteristic, SUB_WAIT).await;
        }
        if !extra.is_zero() {
            sleep(extra).await;
            self.wait_for_signal(characteristic, SUB_WAIT).await;
        }

        let drained = self.drain(characteristic, single);
        debug!(
            characteristic = characteristic_name(&characteristic),
            frames = drained.len(),
            "Drained notifications"
        );
        drained
    }

    fn drain(&self, characteristic: Uuid, single: bool) -> Vec<Vec<u8>> {
        let mut state = self.lock();
        let Some(channel) = state.channels.get_mut(&characteristic) else {
            return Vec::new();
        };
        if single {
            channel.frames.pop_front().into_iter().collect()
        } else {
            channel.frames.drain(..).collect()
        }
    }

    /// Drop every queued frame and cached value, and release pending waits
    pub fn clear(&self) {
        let notifies: Vec<Arc<Notify>> = {
            let mut state = self.lock();
            state.epoch += 1;
            state.latest.clear();
            state
                .channels
                .drain()
                .map(|(_, channel)| channel.notify)
                .collect()
        };
        for notify in notifies {
            notify.notify_waiters();
        }
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
