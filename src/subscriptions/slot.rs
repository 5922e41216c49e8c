//! One-subscription-at-a-time holder for a screen or controller.

use crate::error::Result;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::manager::Subscription;
use super::types::SubscriptionKey;

/// Holds at most one live subscription.
///
/// Switching to a different key closes the current subscription before the
/// new one is opened, so the old feed can never deliver after the new one
/// has started. Overlapping switches run one after another in call order.
/// Dropping the slot closes whatever it holds.
#[derive(Default)]
pub struct SubscriptionSlot {
    current: Mutex<Option<Subscription>>,
    // Held across a whole switch, including the await on `open`.
    switching: tokio::sync::Mutex<()>,
    // Bumped by every switch and clear; an open that finishes under an
    // older generation is discarded.
    generation: AtomicU64,
}

impl SubscriptionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the slot at `key`, opening through `open` if needed.
    ///
    /// Returns `Ok(false)` when the slot already holds a live subscription
    /// for `key`; `open` is not called and the callbacks it captured are
    /// dropped, so the existing subscription keeps delivering to the
    /// callbacks it was opened with. A dead one (after a feed error) is
    /// replaced. Also returns `Ok(false)` when [`clear`](Self::clear) ran
    /// while `open` was pending; the fresh subscription is closed unused.
    ///
    /// A switch that starts while another is still opening waits for it,
    /// then closes what it installed.
    pub async fn switch<F, Fut>(&self, key: SubscriptionKey, open: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Subscription>>,
    {
        let _switching = self.switching.lock().await;

        let generation = {
            let mut current = self.current.lock();
            if let Some(sub) = current.as_ref() {
                if sub.key() == &key && sub.is_live() {
                    return Ok(false);
                }
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(old) = current.take() {
                debug!(from = %old.key(), to = %key, "switching subscription slot");
                old.close();
            }
            generation
        };

        let sub = open().await?;
        if sub.key() != &key {
            warn!(expected = %key, got = %sub.key(), "slot opened with a different key");
        }

        let mut current = self.current.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(key = %key, "slot cleared while opening, discarding");
            drop(current);
            sub.close();
            return Ok(false);
        }
        if let Some(displaced) = current.replace(sub) {
            displaced.close();
        }
        Ok(true)
    }

    /// Key of the held subscription, live or not.
    pub fn key(&self) -> Option<SubscriptionKey> {
        self.current.lock().as_ref().map(|s| s.key().clone())
    }

    pub fn is_live(&self) -> bool {
        self.current.lock().as_ref().is_some_and(Subscription::is_live)
    }

    /// Close and forget the held subscription. A switch still waiting on
    /// its feed will not install what it opens.
    pub fn clear(&self) {
        let taken = {
            let mut current = self.current.lock();
            self.generation.fetch_add(1, Ordering::SeqCst);
            current.take()
        };
        if let Some(sub) = taken {
            sub.close();
        }
    }
}
