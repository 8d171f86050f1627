// drover API server

mod auth;
mod workflows;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use drover_core::{
    Artifact, ContainerSpec, ExecutorSpec, HttpMethod, HttpSpec, Parameter, Settings, Task,
    TaskOptions, TaskRecord, TaskResult, TaskStatus, Workflow, WorkflowMetadata, WorkflowRecord,
    WorkflowStatus,
};
use drover_storage::Database;
use drover_worker::{Broker, Scheduler};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint, useful for liveness and readiness probes.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        workflows::run_workflow,
        workflows::workflow_status,
        workflows::revoke_workflow,
    ),
    components(
        schemas(
            Workflow, WorkflowMetadata, WorkflowRecord, WorkflowStatus,
            Task, TaskRecord, TaskStatus, TaskResult, TaskOptions,
            ExecutorSpec, ContainerSpec, HttpSpec, HttpMethod, Parameter,
            Artifact,
            workflows::ExecutionId,
            workflows::WorkflowIdParams,
        )
    ),
    tags(
        (name = "workflow", description = "Workflow submission, status and revocation")
    ),
    info(
        title = "drover API",
        version = "0.3.0",
        description = "Declarative workflow execution over containers and HTTP calls",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drover_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("drover-api starting...");

    let settings = Settings::from_env();

    let db = Database::from_url(&settings.database_url)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;
    tracing::info!("Connected to database");

    let broker = Broker::connect(&settings.amqp_url)
        .await
        .context("Failed to connect to broker")?;
    broker.declare_queue(&settings.default_queue).await?;
    broker.declare_queue(&settings.failure_queue()).await?;
    tracing::info!(queue = %settings.default_queue, "Connected to broker");

    let scheduler = Scheduler::new(db.clone(), broker.clone(), settings.clone());

    let state = workflows::AppState {
        db: Arc::new(db),
        scheduler: Arc::new(scheduler),
    };
    let api_key = auth::ApiKeyConfig {
        key: settings.api_key.clone(),
        name: settings.api_key_name.clone(),
    };

    // Workflow routes sit behind the API-key guard; health and docs do not.
    let protected = workflows::routes(state).layer(axum::middleware::from_fn_with_state(
        api_key,
        auth::require_api_key,
    ));

    let app = Router::new()
        .route("/healthz", get(health))
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let app = if settings.base_path.is_empty() {
        app
    } else {
        Router::new().nest(&settings.base_path, app)
    };

    // Start server
    let listener = tokio::net::TcpListener::bind(&settings.api_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.api_addr))?;
    tracing::info!("Listening on {}", settings.api_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
