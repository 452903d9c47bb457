use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Monster Lobby Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::create_session,
        crate::routes::sessions::get_session,
        crate::routes::sessions::session_exists,
        crate::routes::sessions::join_session,
        crate::routes::sessions::update_status,
        crate::routes::messages::list_messages,
        crate::routes::messages::recent_messages,
        crate::routes::messages::message_stats,
        crate::routes::messages::post_message,
        crate::routes::messages::post_ai_message,
        crate::routes::messages::delete_message,
        crate::routes::feed::feed_stream,
        crate::routes::feed::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::JoinSessionRequest,
            crate::dto::session::UpdateStatusRequest,
            crate::dto::session::SessionSummary,
            crate::dto::session::SessionExistsResponse,
            crate::dto::message::MessageView,
            crate::dto::message::MessageSender,
            crate::dto::message::MessageStats,
            crate::dto::message::PostMessageRequest,
            crate::dto::message::PostAiMessageRequest,
            crate::dto::feed::FeedHandshake,
            crate::dto::feed::SystemStatus,
            crate::dto::feed::MessageDeletedEvent,
            crate::dto::ws::FeedInboundMessage,
            crate::dto::ws::FeedOutboundMessage,
            crate::dto::ws::FeedEventFrame,
            crate::dao::models::SessionStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Game session lifecycle"),
        (name = "messages", description = "Chat messages of a session"),
        (name = "feed", description = "Per-session change-feed over SSE and WebSocket"),
    )
)]
pub struct ApiDoc;
