/// OpenAPI documentation generation.
pub mod documentation;
/// Change-feed subscription and SSE streaming.
pub mod feed_service;
/// Change-feed event construction and publishing.
pub mod feed_events;
/// Health check service.
pub mod health_service;
/// Chat message reads, posting and deletion.
pub mod message_service;
/// Session creation, membership and status.
pub mod session_service;
/// Storage connection supervisor driving degraded mode.
pub mod storage_supervisor;
/// Outbound webhook delivery.
pub mod webhook_service;
/// WebSocket change-feed handling.
pub mod websocket_service;
