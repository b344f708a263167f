use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use http::StatusCode;
use serde_json::Value;
use tracing::debug;

use bpmnflow_engine::{lookup_property_path, CollaborationDescriptor, ProcessInstance, ProcessManager};

use crate::app_state::AppState;
use crate::dto::{CollaborateRequest, InstanceView};
use crate::error::{AppError, AppResult};

async fn view_of(instance: &ProcessInstance) -> InstanceView {
    instance.snapshot().await.into()
}

/// Create an instance without starting it.
#[utoipa::path(
    post,
    path = "/{processName}",
    params(("processName" = String, Path, description = "Definition name")),
    responses(
        (status = 201, description = "Instance created", body = InstanceView),
        (status = 404, description = "Unknown definition"),
    ),
    tag = "processes"
)]
pub async fn create(
    State(app): State<AppState>,
    Path(process_name): Path<String>,
) -> AppResult<(StatusCode, Json<InstanceView>)> {
    let id = ProcessManager::generate_id();
    let instance = app.manager.create_process_named(&process_name, &id).await?;
    debug!(%process_name, process_id = %id, "created via REST");
    Ok((StatusCode::CREATED, Json(view_of(&instance).await)))
}

/// Create an instance and trigger the named start event with the request
/// body as event data.
#[utoipa::path(
    post,
    path = "/{processName}/{startEventName}",
    params(
        ("processName" = String, Path, description = "Definition name"),
        ("startEventName" = String, Path, description = "Start event to trigger"),
    ),
    responses(
        (status = 201, description = "Instance created and started", body = InstanceView),
        (status = 404, description = "Unknown definition"),
    ),
    tag = "processes"
)]
pub async fn create_and_start(
    State(app): State<AppState>,
    Path((process_name, start_event_name)): Path<(String, String)>,
    body: Option<Json<Value>>,
) -> AppResult<(StatusCode, Json<InstanceView>)> {
    let id = ProcessManager::generate_id();
    let instance = app.manager.create_process_named(&process_name, &id).await?;
    let data = body.map(|Json(v)| v).unwrap_or(Value::Null);
    instance.trigger_event(&start_event_name, data)?;
    instance.flush().await;
    Ok((StatusCode::CREATED, Json(view_of(&instance).await)))
}

/// Fetch one instance view.
#[utoipa::path(
    get,
    path = "/{processName}/{id}",
    params(
        ("processName" = String, Path, description = "Definition name"),
        ("id" = String, Path, description = "Instance id"),
    ),
    responses(
        (status = 200, description = "Instance view", body = InstanceView),
        (status = 404, description = "No such instance"),
    ),
    tag = "processes"
)]
pub async fn get_one(
    State(app): State<AppState>,
    Path((process_name, id)): Path<(String, String)>,
) -> AppResult<Json<InstanceView>> {
    let instance = app
        .manager
        .get_process(&id)
        .await
        .filter(|i| i.process_name() == process_name)
        .ok_or(AppError::NotFound)?;
    Ok(Json(view_of(&instance).await))
}

/// Filter instances of a definition. The `state` query parameter matches
/// current token positions; every other parameter matches properties
/// (dot-separated keys descend).
#[utoipa::path(
    get,
    path = "/{processName}",
    params(("processName" = String, Path, description = "Definition name")),
    responses((status = 200, description = "Matching instance views", body = Vec<InstanceView>)),
    tag = "processes"
)]
pub async fn find(
    State(app): State<AppState>,
    Path(process_name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<Vec<InstanceView>>> {
    let mut views = Vec::new();
    for instance in app.manager.find_by_name(&process_name, true).await {
        if let Some(position) = params.get("state") {
            if !instance.has_token_at(position).await {
                continue;
            }
        }
        let properties = instance.get_properties();
        let matches = params
            .iter()
            .filter(|(key, _)| key.as_str() != "state")
            .all(|(key, expected)| {
                lookup_property_path(&properties, key)
                    .map(|v| v == &Value::String(expected.clone()))
                    .unwrap_or(false)
            });
        if matches {
            views.push(view_of(&instance).await);
        }
    }
    Ok(Json(views))
}

/// Create a collaborating set and trigger the start events named in the
/// descriptors.
#[utoipa::path(
    post,
    path = "/bpmnCollaborate",
    request_body = CollaborateRequest,
    responses(
        (status = 201, description = "Collaboration created", body = Vec<InstanceView>),
        (status = 404, description = "Unknown definition"),
    ),
    tag = "processes"
)]
pub async fn collaborate(
    State(app): State<AppState>,
    Json(request): Json<CollaborateRequest>,
) -> AppResult<(StatusCode, Json<Vec<InstanceView>>)> {
    let descriptors: Vec<CollaborationDescriptor> = request
        .process_descriptors
        .iter()
        .map(|d| CollaborationDescriptor {
            name: d.name.clone(),
            id: d.id.clone(),
        })
        .collect();
    let created = app.manager.create_collaboration(&descriptors).await?;

    for descriptor in &request.process_descriptors {
        let Some(start_event_name) = &descriptor.start_event_name else {
            continue;
        };
        let instance = created
            .iter()
            .find(|i| i.process_id() == descriptor.id)
            .expect("created above");
        instance.trigger_event(start_event_name, Value::Null)?;
    }
    let mut views = Vec::with_capacity(created.len());
    for instance in &created {
        instance.flush().await;
        views.push(view_of(instance).await);
    }
    Ok((StatusCode::CREATED, Json(views)))
}
