use axum::extract::{Path, State};
use axum::Json;
use http::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::app_state::AppState;
use crate::dto::InstanceView;
use crate::error::{AppError, AppResult};
use crate::idempotency::MessageKey;

/// Idempotent event delivery. The first PUT for a message id triggers the
/// event and answers 201; replays answer 200 with the current view and
/// change nothing.
#[utoipa::path(
    put,
    path = "/{processName}/{id}/{messageName}/{messageId}",
    params(
        ("processName" = String, Path, description = "Definition name"),
        ("id" = String, Path, description = "Instance id"),
        ("messageName" = String, Path, description = "Event to trigger"),
        ("messageId" = String, Path, description = "Deduplication id"),
    ),
    responses(
        (status = 200, description = "Replay absorbed", body = InstanceView),
        (status = 201, description = "Event triggered", body = InstanceView),
        (status = 404, description = "No such instance"),
    ),
    tag = "messages"
)]
pub async fn put_message(
    State(app): State<AppState>,
    Path((process_name, id, message_name, message_id)): Path<(String, String, String, String)>,
    body: Option<Json<Value>>,
) -> AppResult<(StatusCode, Json<InstanceView>)> {
    let instance = app
        .manager
        .get_process(&id)
        .await
        .filter(|i| i.process_name() == process_name)
        .ok_or(AppError::NotFound)?;

    let key = MessageKey {
        process_name: process_name.clone(),
        process_id: id.clone(),
        message_name: message_name.clone(),
        message_id: message_id.clone(),
    };
    if !app.idempotency.record(key) {
        debug!(%process_name, %id, %message_name, %message_id, "duplicate message absorbed");
        let view: InstanceView = instance.snapshot().await.into();
        return Ok((StatusCode::OK, Json(view)));
    }

    let data = body.map(|Json(v)| v).unwrap_or(Value::Null);
    instance.trigger_event(&message_name, data)?;
    instance.flush().await;
    let view: InstanceView = instance.snapshot().await.into();
    Ok((StatusCode::CREATED, Json(view)))
}
