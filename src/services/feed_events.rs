use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{
        feed::{MessageDeletedEvent, ServerEvent},
        message::MessageView,
        session::SessionSummary,
    },
    state::SharedState,
};

pub const EVENT_FEED_CONNECTED: &str = "feed.connected";
pub const EVENT_MESSAGE_CREATED: &str = "message.created";
pub const EVENT_MESSAGE_DELETED: &str = "message.deleted";
pub const EVENT_SESSION_UPDATED: &str = "session.updated";

/// Broadcast a freshly stored message to the session's subscribers.
pub fn broadcast_message_created(state: &SharedState, message: &MessageView) {
    send_session_event(state, message.session_id, EVENT_MESSAGE_CREATED, message);
}

/// Broadcast that a message has been removed.
pub fn broadcast_message_deleted(state: &SharedState, session_id: Uuid, message_id: Uuid) {
    let payload = MessageDeletedEvent {
        id: message_id,
        session_id,
    };
    send_session_event(state, session_id, EVENT_MESSAGE_DELETED, &payload);
}

/// Broadcast the new membership or status of a session.
pub fn broadcast_session_updated(state: &SharedState, session: &SessionSummary) {
    send_session_event(state, session.id, EVENT_SESSION_UPDATED, session);
}

fn send_session_event(state: &SharedState, session_id: Uuid, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(event, payload) {
        Ok(event_payload) => {
            let delivered = state.feeds().publish(session_id, event_payload);
            debug!(%session_id, event, delivered, "published feed event");
        }
        Err(err) => warn!(event, error = %err, "failed to serialize feed payload"),
    }
}
