//! Bridges one-shot store watches into a bounded async wait.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::timeout_at;
use tokio::time::Instant;
use tracing::trace;

use crate::WatchListener;
use crate::WatchedEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatcherState {
    Armed,
    Signaled,
    Destroyed,
}

/// Why [`ReservationWatcher::wait_for_event`] returned.
///
/// None of these says anything about the reservation queue itself; callers
/// always re-read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A watched node changed
    Signaled,
    /// The requested timeout or the poll ceiling elapsed
    TimedOut,
    /// The watcher was destroyed
    Destroyed,
}

/// One per in-flight acquisition. It is registered as the listener of every
/// watch the acquisition places, and re-armed before each wait.
pub struct ReservationWatcher {
    state: Mutex<WatcherState>,
    notify: Notify,
    poll_ceiling: Duration,
}

impl ReservationWatcher {
    pub fn new(poll_ceiling: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(WatcherState::Armed),
            notify: Notify::new(),
            poll_ceiling,
        })
    }

    /// Moves a signaled watcher back to armed. A destroyed watcher stays
    /// destroyed.
    pub fn rearm(&self) {
        let mut state = self.state.lock();
        if *state == WatcherState::Signaled {
            *state = WatcherState::Armed;
        }
    }

    /// Waits until a watched node changes, `timeout` elapses, or the poll
    /// ceiling elapses, whichever comes first.
    pub async fn wait_for_event(
        &self,
        timeout: Duration,
    ) -> WaitOutcome {
        let deadline = Instant::now() + timeout.min(self.poll_ceiling);
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking state so a signal between
            // the check and the await is not lost.
            notified.as_mut().enable();

            match *self.state.lock() {
                WatcherState::Signaled => return WaitOutcome::Signaled,
                WatcherState::Destroyed => return WaitOutcome::Destroyed,
                WatcherState::Armed => {}
            }

            if timeout_at(deadline, notified).await.is_err() {
                return WaitOutcome::TimedOut;
            }
        }
    }

    /// Idempotent; unblocks every current waiter. Store registrations are
    /// dropped by the owner of the watcher through
    /// [`crate::CoordinationStore::remove_watches`].
    pub fn destroy(&self) {
        *self.state.lock() = WatcherState::Destroyed;
        self.notify.notify_waiters();
    }

    pub fn is_destroyed(&self) -> bool {
        *self.state.lock() == WatcherState::Destroyed
    }

    pub fn is_signaled(&self) -> bool {
        *self.state.lock() == WatcherState::Signaled
    }
}

impl WatchListener for ReservationWatcher {
    fn process(
        &self,
        event: WatchedEvent,
    ) {
        trace!(?event, "reservation watcher notified");
        {
            let mut state = self.state.lock();
            if *state != WatcherState::Armed {
                return;
            }
            *state = WatcherState::Signaled;
        }
        self.notify.notify_waiters();
    }
}
