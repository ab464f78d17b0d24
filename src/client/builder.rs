use std::sync::Arc;
use std::time::Duration;

use nanoid::nanoid;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::event::route_events;
use super::event::EventRouter;
use super::CoordClient;
use crate::constants::OWNER_ID_LENGTH;
use crate::Acl;
use crate::CoordConfig;
use crate::CoordinationStore;
use crate::HandleCache;
use crate::HandleContext;
use crate::PathScheme;
use crate::ReservationManager;
use crate::Result;
use crate::WaitTimeout;

pub struct CoordClientBuilder {
    store: Arc<dyn CoordinationStore>,
    config: CoordConfig,
    acl: Vec<Acl>,
}

impl CoordClientBuilder {
    /// Create a new builder with default config over `store`
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            config: CoordConfig::default(),
            acl: Acl::open_unsafe(),
        }
    }

    /// Set the owner id written into reservations (default: random)
    pub fn owner_id(
        mut self,
        owner_id: impl Into<String>,
    ) -> Self {
        self.config.client.owner_id = owner_id.into();
        self
    }

    /// Set the namespace root (default: `/d-coord`)
    pub fn base_path(
        mut self,
        base_path: impl Into<String>,
    ) -> Self {
        self.config.path.base_path = base_path.into();
        self
    }

    /// Set the upper bound of a single watcher wait (default: 15s)
    pub fn poll_ceiling(
        mut self,
        ceiling: Duration,
    ) -> Self {
        self.config.reservation.poll_ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the wait used by `lock()` / `acquire()` (default: forever)
    pub fn default_wait_timeout(
        mut self,
        wait: WaitTimeout,
    ) -> Self {
        self.config.reservation.default_wait_timeout_ms = wait.as_millis();
        self
    }

    /// ACL attached to every node the client creates (default: open)
    pub fn acl(
        mut self,
        acl: Vec<Acl>,
    ) -> Self {
        self.acl = acl;
        self
    }

    /// Completely replaces the default configuration
    ///
    /// Discards anything set earlier through
    /// [`owner_id`](Self::owner_id), [`base_path`](Self::base_path) and the
    /// other granular methods.
    ///
    /// # Example
    /// ```ignore
    /// let config = CoordConfig::new()?.validate()?;
    /// let client = CoordClient::builder(store).set_config(config).build().await?;
    /// ```
    pub fn set_config(
        mut self,
        config: CoordConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration, registers the event router as the
    /// store's default listener and starts routing.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn build(self) -> Result<CoordClient> {
        let mut config = self.config.validate()?;
        if config.client.owner_id.is_empty() {
            config.client.owner_id = nanoid!(OWNER_ID_LENGTH);
        }

        let manager = Arc::new(ReservationManager::new(
            self.store.clone(),
            config.reservation.clone(),
            config.retry.clone(),
        ));
        let cache = Arc::new(HandleCache::new());
        let ctx = HandleContext::new(config.client.owner_id.clone(), manager, cache.clone()).with_acl(self.acl);

        let capacity = config.client.event_channel_capacity;
        let (events, _) = broadcast::channel(capacity);
        let (router_tx, router_rx) = mpsc::channel(capacity);
        self.store.register(Arc::new(EventRouter::new(router_tx)));

        let router_shutdown = CancellationToken::new();
        tokio::spawn(route_events(
            router_rx,
            cache,
            events.clone(),
            router_shutdown.clone(),
        ));

        info!(
            owner_id = %config.client.owner_id,
            base_path = %config.path.base_path,
            "coordination client started"
        );
        Ok(CoordClient {
            ctx,
            scheme: PathScheme::from_config(&config.path),
            config: Arc::new(config),
            events,
            router_shutdown,
        })
    }
}
