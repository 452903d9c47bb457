//! Background task owning the storage connection and the degraded flag.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{lobby_store::LobbyStore, storage::StorageError},
    state::SharedState,
};

/// Delays used by [`run_with`].
#[derive(Debug, Clone, Copy)]
pub struct SupervisorTimings {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub health_poll_interval: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for SupervisorTimings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_secs(10),
            health_poll_interval: Duration::from_secs(5),
            max_reconnect_attempts: 3,
        }
    }
}

impl SupervisorTimings {
    fn next_delay(&self, delay: Duration) -> Duration {
        (delay * 2).min(self.max_delay)
    }
}

/// Connect the storage backend and keep the shared state in degraded mode while it is unavailable.
pub async fn run<F, Fut>(state: SharedState, connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn LobbyStore>, StorageError>> + Send,
{
    run_with(state, connect, SupervisorTimings::default()).await
}

pub async fn run_with<F, Fut>(state: SharedState, mut connect: F, timings: SupervisorTimings)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn LobbyStore>, StorageError>> + Send,
{
    let mut delay = timings.initial_delay;

    loop {
        match connect().await {
            Ok(store) => {
                info!("storage connection established");
                state.set_lobby_store(store.clone()).await;
                delay = timings.initial_delay;

                watch_store(&state, store.as_ref(), &timings).await;

                warn!("storage lost; reconnecting from scratch");
                state.clear_lobby_store().await;
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
            }
        }

        sleep(delay).await;
        delay = timings.next_delay(delay);
    }
}

/// Poll `store` until it cannot be recovered in place.
async fn watch_store(state: &SharedState, store: &dyn LobbyStore, timings: &SupervisorTimings) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again");
                    state.update_degraded(false);
                }
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed; entering degraded mode");
                state.update_degraded(true);
                if !reconnect_in_place(store, timings).await {
                    warn!("exhausted storage reconnect attempts");
                    return;
                }
                info!("storage reconnection succeeded");
                state.update_degraded(false);
            }
        }
        sleep(timings.health_poll_interval).await;
    }
}

async fn reconnect_in_place(store: &dyn LobbyStore, timings: &SupervisorTimings) -> bool {
    let mut delay = timings.initial_delay;
    for attempt in 1..=timings.max_reconnect_attempts {
        match store.try_reconnect().await {
            Ok(()) => return true,
            Err(err) => {
                warn!(attempt, error = %err, "storage reconnect attempt failed");
                sleep(delay).await;
                delay = timings.next_delay(delay);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use futures::future::BoxFuture;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            lobby_store::memory::MemoryLobbyStore,
            models::{MessageEntity, MessageOrder, SessionEntity},
            storage::StorageResult,
        },
        state::AppState,
    };

    /// Memory store whose health can be switched off from the test.
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: MemoryLobbyStore,
        healthy: Arc<AtomicBool>,
        reconnects: Arc<AtomicUsize>,
    }

    fn outage() -> StorageError {
        StorageError::unavailable(
            "simulated outage".into(),
            std::io::Error::other("connection refused"),
        )
    }

    impl LobbyStore for FlakyStore {
        fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.insert_session(session)
        }

        fn find_session(
            &self,
            id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
            self.inner.find_session(id)
        }

        fn replace_session(
            &self,
            session: SessionEntity,
            expected_version: u64,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            self.inner.replace_session(session, expected_version)
        }

        fn insert_message(&self, message: MessageEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.insert_message(message)
        }

        fn list_messages(
            &self,
            session_id: Uuid,
            order: MessageOrder,
            limit: usize,
        ) -> BoxFuture<'static, StorageResult<Vec<MessageEntity>>> {
            self.inner.list_messages(session_id, order, limit)
        }

        fn count_messages(
            &self,
            session_id: Uuid,
            ai_only: bool,
        ) -> BoxFuture<'static, StorageResult<u64>> {
            self.inner.count_messages(session_id, ai_only)
        }

        fn delete_message(
            &self,
            session_id: Uuid,
            message_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            self.inner.delete_message(session_id, message_id)
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            let healthy = self.healthy.load(Ordering::SeqCst);
            Box::pin(async move { if healthy { Ok(()) } else { Err(outage()) } })
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            let healthy = self.healthy.clone();
            Box::pin(async move {
                if healthy.load(Ordering::SeqCst) {
                    Ok(())
                } else {
                    Err(outage())
                }
            })
        }
    }

    fn fast_timings() -> SupervisorTimings {
        SupervisorTimings {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            health_poll_interval: Duration::from_millis(5),
            max_reconnect_attempts: 2,
        }
    }

    async fn wait_for_degraded(state: &SharedState, expected: bool) {
        let mut watcher = state.degraded_watcher();
        tokio::time::timeout(
            Duration::from_secs(2),
            watcher.wait_for(|degraded| *degraded == expected),
        )
        .await
        .expect("degraded flag did not settle")
        .expect("degraded channel closed");
    }

    #[tokio::test]
    async fn installs_store_and_tracks_outages() {
        let state = AppState::new(AppConfig::default());
        let store = FlakyStore {
            healthy: Arc::new(AtomicBool::new(true)),
            ..FlakyStore::default()
        };
        let healthy = store.healthy.clone();
        let reconnects = store.reconnects.clone();

        let supervisor = tokio::spawn(run_with(
            state.clone(),
            move || {
                let store = store.clone();
                async move { Ok(Arc::new(store) as Arc<dyn LobbyStore>) }
            },
            fast_timings(),
        ));

        wait_for_degraded(&state, false).await;
        assert!(state.lobby_store().await.is_some());

        healthy.store(false, Ordering::SeqCst);
        wait_for_degraded(&state, true).await;

        healthy.store(true, Ordering::SeqCst);
        wait_for_degraded(&state, false).await;
        assert!(reconnects.load(Ordering::SeqCst) >= 1);

        supervisor.abort();
    }

    #[tokio::test]
    async fn keeps_retrying_failed_connections() {
        let state = AppState::new(AppConfig::default());
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let supervisor = tokio::spawn(run_with(
            state.clone(),
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(outage())
                    } else {
                        Ok(Arc::new(MemoryLobbyStore::new()) as Arc<dyn LobbyStore>)
                    }
                }
            },
            fast_timings(),
        ));

        wait_for_degraded(&state, false).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        supervisor.abort();
    }
}
