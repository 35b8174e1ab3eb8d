pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

pub const DEFAULT_PORT: u16 = 3001;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pathfinder API",
        version = "0.1.0",
        description = "Venue recommendations for group outings"
    ),
    paths(
        routes::health_check,
        routes::create_plan,
        routes::websocket_handler,
        routes::sse::events_stream,
    ),
    components(schemas(
        routes::HealthResponse,
        error::ErrorResponse,
        pathfinder_core::PlanRequest,
        pathfinder_core::ChatTurn,
        pathfinder_core::Coordinates,
        pathfinder_core::PlanResponse,
        pathfinder_core::RankedVenue,
        pathfinder_core::DimensionContribution,
        pathfinder_core::Dimension,
        pathfinder_core::PendingAction,
        pathfinder_core::ActionStatus,
        pathfinder_core::ExecutionSummary,
        pathfinder_core::ComplexityTier,
        pathfinder_core::StageId,
        pathfinder_core::PriceTier,
        pathfinder_core::PriceConfidence,
        events::EventEnvelope,
        events::Event,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "plan", description = "Venue planning endpoints"),
        (name = "events", description = "Real-time event streaming (SSE)"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health_check))
        .route("/api/plan", post(routes::create_plan))
        .route("/api/plan/ws", get(routes::websocket_handler))
        .route("/api/events", get(routes::sse::events_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
