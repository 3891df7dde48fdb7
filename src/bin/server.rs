use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use sensor_query::{
    QueryEngine, QueryParams, QueryReport, SensorError, SensorField, SensorQueryConfig, SortOrder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

type AppState = Arc<QueryEngine>;

#[derive(Debug, Deserialize)]
struct QueryArgs {
    start: u64,
    end: u64,
    sort: Option<String>,
    order: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    endpoint: String,
    page_size: u64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting sensor query server");

    let config = SensorQueryConfig::from_env();
    let bind_address = config
        .bind_address
        .clone()
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());

    info!("Search endpoint: {}", config.endpoint_url);
    info!("Page size: {}", config.page_size);
    info!("Failure policy: {:?}", config.failure_policy);

    let engine = QueryEngine::connect(config)?;
    let app_state: AppState = Arc::new(engine);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/query/:field", get(query_field))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .into_inner(),
        )
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Server listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(engine): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        endpoint: engine.config().endpoint_url.clone(),
        page_size: engine.config().page_size,
    })
}

async fn query_field(
    State(engine): State<AppState>,
    Path(field): Path<String>,
    Query(args): Query<QueryArgs>,
) -> Result<Json<QueryReport>, (StatusCode, Json<ErrorResponse>)> {
    let field: SensorField = field.parse().map_err(error_response)?;
    let order = match args.order.as_deref() {
        Some(order) => order.parse::<SortOrder>().map_err(error_response)?,
        None => SortOrder::Ascending,
    };

    let mut params = QueryParams::new(field, args.start, args.end);
    if let Some(sort_key) = args.sort {
        params = params.with_sort(sort_key, order);
    } else {
        params.sort_order = order;
    }

    match engine.query(params).await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            error!("Query for {} failed: {}", field, e);
            Err(error_response(e))
        }
    }
}

fn error_response(e: SensorError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        SensorError::UnknownField(_) | SensorError::InvalidTimeRange(..) | SensorError::Config { .. } => {
            StatusCode::BAD_REQUEST
        }
        SensorError::Probe { .. } | SensorError::PageFetch { .. } => StatusCode::BAD_GATEWAY,
        SensorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(ErrorResponse { error: e.to_string() }))
}
