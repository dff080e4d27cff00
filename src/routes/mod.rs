use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub mod conversations;
pub mod messages;

use conversations::{list_conversations, mark_as_read};
use messages::{get_message_history, send_message};

use crate::websocket::handlers::ws_handler;

pub fn build_router(state: AppState) -> Router {
    // Service introspection endpoints, public for healthchecks.
    let introspection = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(crate::metrics::metrics_handler));

    // Request/response surface; auth middleware refuses unverified
    // callers before any handler runs.
    let api_v1 = Router::new()
        .route("/messages", post(send_message))
        .route("/conversations", get(list_conversations))
        .route(
            "/conversations/:other_user_id/messages",
            get(get_message_history),
        )
        .route("/conversations/:other_user_id/read", post(mark_as_read))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::auth_middleware,
        ))
        // The websocket upgrade authenticates inside the handler (the
        // token may arrive as a query parameter), so it sits outside
        // the header-based auth layer.
        .route("/ws", get(ws_handler));

    let router = introspection.merge(Router::new().nest("/api/v1", api_v1));

    crate::middleware::with_defaults(router).with_state(state)
}
