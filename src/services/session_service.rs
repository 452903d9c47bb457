//! Session lifecycle: creation, lookups, membership and status updates.
//!
//! Writes go through a version compare-and-swap so that simultaneous joins
//! never overwrite each other's membership changes.

use std::{sync::Arc, time::Duration};

use rand::{Rng, rng};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        lobby_store::LobbyStore,
        models::{SessionEntity, SessionStatus},
    },
    dto::{session::SessionSummary, validation::validate_username},
    error::ServiceError,
    services::feed_events,
    state::SharedState,
};

/// Attempts made before a contended session update gives up.
pub const MAX_UPDATE_ATTEMPTS: usize = 5;
/// Upper bound of the random pause taken after a conflicting write.
const CONFLICT_BACKOFF_MAX_MS: u64 = 20;

/// Trim and validate a username coming from any transport.
pub fn normalize_username(raw: &str) -> Result<String, ServiceError> {
    validate_username(raw).map_err(|err| {
        ServiceError::InvalidInput(
            err.message
                .map(|message| message.into_owned())
                .unwrap_or_else(|| "invalid username".into()),
        )
    })?;
    Ok(raw.trim().to_string())
}

/// Open a new session, optionally with its creator as first member.
pub async fn create_session(
    state: &SharedState,
    username: Option<String>,
) -> Result<SessionSummary, ServiceError> {
    let users = match username {
        Some(name) => vec![normalize_username(&name)?],
        None => Vec::new(),
    };

    let store = state.require_lobby_store().await?;
    let session = SessionEntity::new(users);
    store.insert_session(session.clone()).await?;
    info!(session_id = %session.id, members = session.users.len(), "session created");

    Ok(session.into())
}

pub async fn get_session(state: &SharedState, id: Uuid) -> Result<SessionSummary, ServiceError> {
    let store = state.require_lobby_store().await?;
    let session = load_session(&store, id).await?;
    Ok(session.into())
}

/// Cheap existence probe. Storage failures are reported, not folded into `false`.
pub async fn session_exists(state: &SharedState, id: Uuid) -> Result<bool, ServiceError> {
    let store = state.require_lobby_store().await?;
    Ok(store.find_session(id).await?.is_some())
}

/// Add `username` to the session. Joining twice is a no-op.
pub async fn join_session(
    state: &SharedState,
    id: Uuid,
    username: &str,
) -> Result<SessionSummary, ServiceError> {
    let username = normalize_username(username)?;
    let store = state.require_lobby_store().await?;

    let (session, changed) = update_with_retry(&store, id, |current| {
        if current.has_user(&username) {
            return None;
        }
        let mut next = current.next_revision();
        next.users.push(username.clone());
        Some(next)
    })
    .await?;

    let summary = SessionSummary::from(session);
    if changed {
        info!(session_id = %id, user = %username, "player joined session");
        feed_events::broadcast_session_updated(state, &summary);
    } else {
        debug!(session_id = %id, user = %username, "player already in session");
    }
    Ok(summary)
}

/// Move the session to `status`, keeping its members.
pub async fn update_status(
    state: &SharedState,
    id: Uuid,
    status: SessionStatus,
) -> Result<SessionSummary, ServiceError> {
    let store = state.require_lobby_store().await?;

    let (session, changed) = update_with_retry(&store, id, |current| {
        if current.status == status {
            return None;
        }
        let mut next = current.next_revision();
        next.status = status;
        Some(next)
    })
    .await?;

    let summary = SessionSummary::from(session);
    if changed {
        info!(session_id = %id, ?status, "session status updated");
        feed_events::broadcast_session_updated(state, &summary);
    }
    Ok(summary)
}

pub(crate) async fn load_session(
    store: &Arc<dyn LobbyStore>,
    id: Uuid,
) -> Result<SessionEntity, ServiceError> {
    store
        .find_session(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{id}` not found")))
}

/// Read-modify-write loop. `mutate` returns `None` when nothing needs to change.
///
/// Returns the resulting session and whether a write happened.
async fn update_with_retry<F>(
    store: &Arc<dyn LobbyStore>,
    id: Uuid,
    mut mutate: F,
) -> Result<(SessionEntity, bool), ServiceError>
where
    F: FnMut(&SessionEntity) -> Option<SessionEntity>,
{
    for attempt in 1..=MAX_UPDATE_ATTEMPTS {
        let current = load_session(store, id).await?;
        let Some(next) = mutate(&current) else {
            return Ok((current, false));
        };

        match store.replace_session(next.clone(), current.version).await {
            Ok(true) => return Ok((next, true)),
            Ok(false) => {
                return Err(ServiceError::NotFound(format!("session `{id}` not found")));
            }
            Err(err) if err.is_conflict() => {
                debug!(session_id = %id, attempt, "session write conflicted; retrying");
                if attempt < MAX_UPDATE_ATTEMPTS {
                    sleep(conflict_backoff(attempt)).await;
                }
            }
            Err(err) => return Err(err.into()),
        }
    }

    warn!(
        session_id = %id,
        attempts = MAX_UPDATE_ATTEMPTS,
        "giving up on contended session update"
    );
    Err(ServiceError::InvalidState(format!(
        "session `{id}` is being updated concurrently; retry later"
    )))
}

/// Random pause before the next attempt, widening with `attempt`.
fn conflict_backoff(attempt: usize) -> Duration {
    let ceiling = CONFLICT_BACKOFF_MAX_MS * attempt as u64;
    Duration::from_millis(rng().random_range(1..=ceiling))
}
