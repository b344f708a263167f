pub mod message;
pub mod process;

use axum::{
    routing::{post, put},
    Router,
};

use crate::app_state::AppState;

/// The façade's literal route table. The static `/bpmnCollaborate` path wins
/// over the `/:processName` capture.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/bpmnCollaborate", post(process::collaborate))
        .route("/:process_name", post(process::create).get(process::find))
        .route(
            "/:process_name/:segment",
            post(process::create_and_start).get(process::get_one),
        )
        .route(
            "/:process_name/:id/:message_name/:message_id",
            put(message::put_message),
        )
        .with_state(state)
}
