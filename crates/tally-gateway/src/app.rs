use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    create_link_handler, delete_link_handler, get_link_handler, health_handler,
    list_links_handler, purge_expired_handler, redirect_handler,
};
use crate::state::AppState;

pub struct App {}

impl App {
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/v1/links", post(create_link_handler).get(list_links_handler))
            // Static segment, matched ahead of the code parameter below.
            .route("/v1/links/expired", delete(purge_expired_handler))
            .route(
                "/v1/links/{short_code}",
                get(get_link_handler).delete(delete_link_handler),
            )
            .route("/{short_code}", get(redirect_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}
