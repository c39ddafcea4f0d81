use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the lobby coordinator harness.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::event_stream,
        crate::routes::members::get_session,
        crate::routes::members::set_ready,
        crate::routes::members::toggle_vote,
        crate::routes::members::request_pause,
        crate::routes::members::signal_start,
        crate::routes::members::send_chat,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::Handshake,
            crate::dto::members::SessionSnapshot,
            crate::dto::members::MemberSummary,
            crate::dto::members::PauseSummary,
            crate::dto::members::ReadyRequest,
            crate::dto::members::ChatRequest,
            crate::dto::members::VoteResponse,
            crate::dto::members::ActionResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent event stream of coordinator events"),
        (name = "members", description = "Actions performed on behalf of a hosted participant"),
    )
)]
pub struct ApiDoc;
