//! Request tokens and per-slot bookkeeping.
//!
//! A slot is one logical "latest request" channel (one per layer per
//! coordinator, one for pixel queries).  Issuing a token for a slot cancels
//! whatever token that slot held before; a finished request publishes only
//! if its token is still the one registered for its slot.
//!
//! Cancellation is cooperative: the fetch future is raced against the token
//! in `run_cancellable`, so a superseded reqwest future is dropped (aborting
//! the HTTP request), and the arrival check still rejects anything that
//! slipped through.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::FetchError;

/// Cancellation handle bound to one in-flight request.
#[derive(Debug, Clone)]
pub struct RequestToken {
    generation: u64,
    cancel: CancellationToken,
    aborted: Arc<AtomicBool>,
}

impl RequestToken {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            cancel: CancellationToken::new(),
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancel because a newer request replaced this one.  No-op if already
    /// cancelled or finished.
    pub fn supersede(&self) {
        self.cancel.cancel();
    }

    /// Cancel because the slot was shut down.  No-op if already cancelled.
    pub fn abort(&self) {
        if !self.cancel.is_cancelled() {
            self.aborted.store(true, Ordering::Relaxed);
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The error a cancelled request reports.
    pub fn cancel_reason(&self) -> FetchError {
        if self.aborted.load(Ordering::Relaxed) {
            FetchError::Aborted
        } else {
            FetchError::Cancelled
        }
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Drive `fut` unless `token` is cancelled first.
pub async fn run_cancellable<T, F>(token: &RequestToken, fut: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(token.cancel_reason()),
        res = fut => res,
    }
}

/// Live tokens keyed by slot.
#[derive(Debug)]
pub struct SlotRegistry<K> {
    next_generation: u64,
    live: HashMap<K, RequestToken>,
}

impl<K: Eq + Hash + Clone + Debug> Default for SlotRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + Debug> SlotRegistry<K> {
    pub fn new() -> Self {
        Self {
            next_generation: 1,
            live: HashMap::new(),
        }
    }

    /// Register a fresh token for `slot`, superseding the previous one.
    pub fn issue(&mut self, slot: K) -> RequestToken {
        let token = RequestToken::new(self.next_generation);
        self.next_generation += 1;
        if let Some(prev) = self.live.insert(slot.clone(), token.clone()) {
            trace!(
                "slot {:?}: gen {} supersedes gen {}",
                slot,
                token.generation,
                prev.generation
            );
            prev.supersede();
        }
        token
    }

    /// Is `generation` still the active token for `slot`?
    pub fn is_current(&self, slot: &K, generation: u64) -> bool {
        self.live
            .get(slot)
            .is_some_and(|t| t.generation == generation && !t.is_cancelled())
    }

    /// Release the slot after its request finished.  Returns `false` (and
    /// leaves the slot alone) when `generation` is not the active token.
    pub fn complete(&mut self, slot: &K, generation: u64) -> bool {
        if self.is_current(slot, generation) {
            self.live.remove(slot);
            true
        } else {
            false
        }
    }

    /// Abort whatever is live in `slot`.  Returns whether anything was live;
    /// cancelling an empty slot is a no-op.
    pub fn abort(&mut self, slot: &K) -> bool {
        match self.live.remove(slot) {
            Some(token) => {
                token.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every slot not accepted by `keep`.
    pub fn abort_where(&mut self, mut keep: impl FnMut(&K) -> bool) -> usize {
        let doomed: Vec<K> = self.live.keys().filter(|k| !keep(k)).cloned().collect();
        for slot in &doomed {
            self.abort(slot);
        }
        doomed.len()
    }

    pub fn abort_all(&mut self) -> usize {
        self.abort_where(|_| false)
    }

    pub fn in_flight(&self) -> usize {
        self.live.len()
    }
}
