//! Routes store notifications to handles and subscribers.
//!
//! The store calls the router on its callback path, which must not block,
//! so [`EventRouter`] only forwards into a bounded channel. A background
//! task drains it, updates handle state through the [`HandleCache`] and
//! publishes [`ReservationEvent`]s.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::HandleCache;
use crate::SessionState;
use crate::WatchEventType;
use crate::WatchListener;
use crate::WatchedEvent;

/// Something that happened to the client's reservations outside of a call
/// made by the client itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationEvent {
    /// A reservation a live handle held was deleted behind its back. The
    /// handle no longer considers it held.
    Revoked {
        entity_path: String,
        reservation_path: String,
    },
    /// The store connection dropped. Held reservations are in doubt until
    /// `Reconnected` or `SessionExpired` follows.
    ConnectionLost,
    /// The store session ended and took every reservation with it.
    SessionExpired,
    Reconnected,
}

pub(crate) struct EventRouter {
    tx: mpsc::Sender<WatchedEvent>,
}

impl EventRouter {
    pub(crate) fn new(tx: mpsc::Sender<WatchedEvent>) -> Self {
        Self { tx }
    }
}

impl WatchListener for EventRouter {
    fn process(
        &self,
        event: WatchedEvent,
    ) {
        if let Err(e) = self.tx.try_send(event) {
            warn!("dropping store event: {}", e);
        }
    }
}

/// Drains routed store events until `shutdown` fires or every sender is
/// gone.
pub(crate) async fn route_events(
    mut rx: mpsc::Receiver<WatchedEvent>,
    cache: Arc<HandleCache>,
    events: broadcast::Sender<ReservationEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if let Some(published) = dispatch(&cache, event) {
            // No subscribers is fine
            let _ = events.send(published);
        }
    }
    debug!("event router stopped");
}

fn dispatch(
    cache: &HandleCache,
    event: WatchedEvent,
) -> Option<ReservationEvent> {
    match (event.session_state, event.event_type) {
        (SessionState::Expired, _) => {
            // Ephemeral reservations died with the session; nothing to delete
            let revoked = cache.revoke_all();
            warn!(revoked, "store session expired");
            Some(ReservationEvent::SessionExpired)
        }
        (SessionState::Disconnected, _) => {
            // The session may survive the outage, so holds stay in doubt
            // rather than released
            warn!(handles = cache.len(), "store connection lost");
            Some(ReservationEvent::ConnectionLost)
        }
        (SessionState::SyncConnected, WatchEventType::None) => {
            info!("store connection restored");
            Some(ReservationEvent::Reconnected)
        }
        (SessionState::SyncConnected, WatchEventType::NodeDeleted) => {
            let path = event.path?;
            let holder = cache.find_holder(&path)?;
            if !holder.mark_revoked(&path) {
                return None;
            }
            Some(ReservationEvent::Revoked {
                entity_path: holder.entity_path().to_string(),
                reservation_path: path,
            })
        }
        _ => None,
    }
}
