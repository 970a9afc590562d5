use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};

use crate::auth::gate::{extract_user, screen_request};
use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod memory;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/health", get(handlers::health))
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login));

    let user = Router::new()
        .route("/user", get(handlers::user_details))
        .route_layer(from_fn_with_state(state.clone(), extract_user));

    let broker = Router::new()
        .route("/activate", put(handlers::activate))
        .route_layer(from_fn_with_state(state.clone(), screen_request));

    Router::new().merge(public).merge(user).merge(broker)
}
