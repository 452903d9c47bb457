mod feed;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    dao::lobby_store::LobbyStore,
    dto::feed::{ServerEvent, SystemStatus},
    error::ServiceError,
    services::webhook_service::WebhookNotifier,
};

pub use self::feed::{FeedHub, FeedHubs};

pub type SharedState = Arc<AppState>;

const FEED_CAPACITY: usize = 64;
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Central application state storing the storage handle, feeds and outbound clients.
pub struct AppState {
    lobby_store: RwLock<Option<Arc<dyn LobbyStore>>>,
    degraded: watch::Sender<bool>,
    feeds: FeedHubs,
    webhook: WebhookNotifier,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            lobby_store: RwLock::new(None),
            degraded: degraded_tx,
            feeds: FeedHubs::new(FEED_CAPACITY),
            webhook: WebhookNotifier::new(config.webhook.clone()),
            config,
        })
    }

    /// Build a state with `store` already installed.
    pub async fn with_store(config: AppConfig, store: Arc<dyn LobbyStore>) -> SharedState {
        let state = Self::new(config);
        state.set_lobby_store(store).await;
        state
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn lobby_store(&self) -> Option<Arc<dyn LobbyStore>> {
        let guard = self.lobby_store.read().await;
        guard.as_ref().cloned()
    }

    /// Store handle for operations that need persistence; fails while degraded.
    pub async fn require_lobby_store(&self) -> Result<Arc<dyn LobbyStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.lobby_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn set_lobby_store(&self, store: Arc<dyn LobbyStore>) {
        {
            let mut guard = self.lobby_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_lobby_store(&self) {
        {
            let mut guard = self.lobby_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update the degraded flag and announce it on every live feed when it changes.
    pub fn update_degraded(&self, value: bool) {
        if self.degraded.send_replace(value) == value {
            return;
        }

        if value {
            warn!("entering degraded mode");
        } else {
            info!("leaving degraded mode");
        }

        match ServerEvent::json(EVENT_SYSTEM_STATUS, &SystemStatus { degraded: value }) {
            Ok(event) => self.feeds.publish_all(&event),
            Err(err) => warn!(error = %err, "failed to serialise system status event"),
        }
    }

    /// Per-session change-feed hubs.
    pub fn feeds(&self) -> &FeedHubs {
        &self.feeds
    }

    /// Outbound webhook used to forward player messages.
    pub fn webhook(&self) -> &WebhookNotifier {
        &self.webhook
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::lobby_store::memory::MemoryLobbyStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_lobby_store().await,
            Err(ServiceError::Degraded)
        ));

        state
            .set_lobby_store(Arc::new(MemoryLobbyStore::new()))
            .await;
        assert!(!state.is_degraded());
        assert!(state.require_lobby_store().await.is_ok());
    }

    #[tokio::test]
    async fn degraded_flips_are_announced_on_feeds() {
        let state =
            AppState::with_store(AppConfig::default(), Arc::new(MemoryLobbyStore::new())).await;
        let mut rx = state.feeds().subscribe(Uuid::new_v4());

        state.clear_lobby_store().await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, EVENT_SYSTEM_STATUS);
        assert_eq!(event.data["degraded"], true);

        // Repeating the same value is silent.
        state.update_degraded(true);
        assert!(rx.try_recv().is_err());
    }
}
