pub mod auth;
pub mod error;
pub mod health;
pub mod input;
pub mod messages;
pub mod otp;
pub mod password;
pub mod vehicles;

use axum::{
    Router,
    routing::{get, post},
};

use crate::auth::AppState;

/// Every route the backend serves. Cross-cutting layers (CORS, tracing) are
/// added by the server binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/auth/send-otp", post(auth::send_otp))
        .route("/auth/verify-otp", post(auth::verify_otp))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/vehicles/{vnum}", get(vehicles::get_vehicle))
        .route("/messages/send", post(messages::send_message))
        .route(
            "/messages/chat/{other_user_id}/{my_user_id}",
            get(messages::get_conversation),
        )
        .route("/messages/inbox/{user_id}", get(messages::get_inbox))
        .with_state(state)
}
