pub mod registry;

use axum::Router;

use agentry_core::state::AppState;

/// Build the complete API router with all sub-routes.
pub fn api_router() -> Router<AppState> {
    Router::new().nest("/registry", registry::router())
}
