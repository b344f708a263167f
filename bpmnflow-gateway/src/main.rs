use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use bpmnflow_common::{BpmnflowConfig, StoreBackend};
use bpmnflow_engine::ProcessManager;
use bpmnflow_hook::{impls::log_hook::LogHook, EngineEventDispatcher};
use bpmnflow_store::{MemoryStore, ProcessStore, SqliteStore};

use bpmnflow_gateway::{router, AppState};

#[derive(OpenApi)]
#[openapi(
    paths(
        bpmnflow_gateway::routes::process::create,
        bpmnflow_gateway::routes::process::create_and_start,
        bpmnflow_gateway::routes::process::get_one,
        bpmnflow_gateway::routes::process::find,
        bpmnflow_gateway::routes::process::collaborate,
        bpmnflow_gateway::routes::message::put_message,
    ),
    components(schemas(
        bpmnflow_gateway::dto::InstanceView,
        bpmnflow_gateway::dto::Link,
        bpmnflow_gateway::dto::CollaborateRequest,
        bpmnflow_gateway::dto::ProcessDescriptorDto,
    )),
    tags(
        (name = "processes", description = "Process instance lifecycle"),
        (name = "messages", description = "Idempotent event delivery"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("bpmnflow_gateway=debug".parse()?),
        )
        .init();

    let config = BpmnflowConfig::from_env()?;
    let store: Arc<dyn ProcessStore> = match config.store {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite => Arc::new(SqliteStore::connect(&config.db_path).await?),
    };
    let hooks = Arc::new(EngineEventDispatcher::new(vec![LogHook::new()]));
    let manager = ProcessManager::new(Some(store), hooks, None);

    // embedding deployments register their definitions on `manager` here,
    // before the listener starts accepting traffic

    let app = axum::Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(router(AppState::new(manager)))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    tracing::info!(bind = %config.bind, store = %config.store, "bpmnflow gateway listening");
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
