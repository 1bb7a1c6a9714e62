//! Single-flight debounce scheduler
//!
//! Holds at most one pending timer and one current cancellation token.
//! `schedule` cancels whatever was pending or in flight before arming new
//! work, under the same lock that `FlightGuard::commit` takes, so a
//! superseded flight can never commit after its replacement was scheduled.
//!
//! Cancellation is cooperative: a cancelled timer ends early, but work that
//! already started runs to completion and is only prevented from committing.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Slot {
    generation: u64,
    token: CancellationToken,
}

/// Debounce + supersede scheduler
#[derive(Debug, Clone)]
pub struct SingleFlight {
    slot: Arc<Mutex<Slot>>,
}

/// Handle given to scheduled work
#[derive(Debug)]
pub struct FlightGuard {
    slot: Arc<Mutex<Slot>>,
    token: CancellationToken,
    generation: u64,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SingleFlight {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                token: CancellationToken::new(),
            })),
        }
    }

    /// Supersede any pending or in-flight work and arm `work` to run after
    /// `delay` of quiet
    ///
    /// `on_armed` runs while the scheduler lock is held, after the previous
    /// flight was cancelled. Returns the generation of the new flight.
    pub fn schedule<F, Fut, A>(&self, delay: Duration, on_armed: A, work: F) -> u64
    where
        A: FnOnce(),
        F: FnOnce(FlightGuard) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = lock(&self.slot);

        slot.token.cancel();
        slot.generation += 1;
        let token = CancellationToken::new();
        slot.token = token.clone();
        let generation = slot.generation;

        let guard = FlightGuard {
            slot: Arc::clone(&self.slot),
            token: token.clone(),
            generation,
        };

        on_armed();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::trace!(generation, "Debounce timer superseded");
                }
                _ = tokio::time::sleep(delay) => {
                    work(guard).await;
                }
            }
        });

        generation
    }

}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl FlightGuard {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Run `f` unless this flight was superseded
    ///
    /// The staleness check and `f` happen under the scheduler lock.
    pub fn commit<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let _slot = lock(&self.slot);
        if self.token.is_cancelled() {
            None
        } else {
            Some(f())
        }
    }
}
