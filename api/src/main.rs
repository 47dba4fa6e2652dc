use std::net::SocketAddr;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod broker;
mod error;
mod extract;
mod middleware;
mod routes;
mod state;
mod telemetry;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Opsdesk API",
        version = "0.1.0",
        description = "Conversational action broker for organizational ops: assistant turns \
                       accumulate a draft intent, explicit confirmation executes it."
    ),
    paths(
        routes::health::health_check,
        routes::assistant::assistant_turn,
        routes::assistant::get_pending,
        routes::assistant::confirm_action,
        routes::assistant::cancel_pending,
    ),
    components(schemas(
        opsdesk_core::error::ApiError,
        opsdesk_core::actions::ActionType,
        opsdesk_core::actions::ActionRequest,
        opsdesk_core::actions::ActionResult,
        opsdesk_core::actions::ClassifiedIntent,
        opsdesk_core::pending::PendingAction,
        opsdesk_core::pending::PendingStatus,
        routes::assistant::TurnState,
        routes::assistant::TurnResponse,
        routes::assistant::CancelResponse,
        HealthResponse,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opsdesk_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Database connection
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let app_state = state::AppState { db: pool };

    // CORS
    let cors_layer = middleware::cors::build_cors_layer();

    // Router with per-endpoint rate limiting on assistant routes
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(
            routes::assistant::write_router()
                .layer(middleware::rate_limit::assistant_write_layer()),
        )
        .merge(
            routes::assistant::read_router().layer(middleware::rate_limit::assistant_read_layer()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Opsdesk API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
