use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod extract;
pub mod feed;
pub mod health;
pub mod messages;
pub mod sessions;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sessions::router())
        .merge(messages::router())
        .merge(feed::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}

#[cfg(test)]
mod tests;
