use std::time::Duration;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tile_packer::{Inventory, Packer, SolvedInstance, SolverConfig, Strategy};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize, Serialize)]
struct SolveRequest {
    inventory: Inventory,
    #[serde(default)]
    strategy: Strategy,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    dimension: Option<u32>,
    #[serde(default)]
    threads: Option<usize>,
    #[serde(default)]
    time_limit_secs: Option<f64>,
}

fn prepare(req: SolveRequest) -> Result<(Packer, SolverConfig), (StatusCode, String)> {
    let bad_request = |message: String| (StatusCode::BAD_REQUEST, message);

    let mut config = SolverConfig::new();
    if let Some(threads) = req.threads {
        if threads == 0 {
            return Err(bad_request("threads must be non-zero".to_string()));
        }
        config = config.with_threads(threads);
    }
    if let Some(secs) = req.time_limit_secs {
        let limit = Duration::try_from_secs_f64(secs)
            .map_err(|_| bad_request(format!("invalid time limit {secs}")))?;
        config = config.with_time_limit(limit);
    }

    let name = req.name.unwrap_or_else(|| "request".to_string());
    let mut packer = Packer::new(name, &req.inventory, req.strategy)
        .map_err(|e| bad_request(e.to_string()))?;
    if let Some(dimension) = req.dimension {
        packer = packer
            .with_dimension(dimension)
            .map_err(|e| bad_request(e.to_string()))?;
    }
    Ok((packer, config))
}

async fn solve(
    Json(req): Json<SolveRequest>,
) -> Result<Json<SolvedInstance>, (StatusCode, String)> {
    tracing::info!(
        body = serde_json::to_string(&req).unwrap_or_default(),
        "POST /solve"
    );

    let (packer, config) = prepare(req)?;
    let instance = tokio::task::spawn_blocking(move || packer.solve(&config))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(instance))
}

fn router() -> Router {
    Router::new()
        .route("/up", get(|| async { "ok" }))
        .route("/solve", post(solve))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

#[tokio::main]
async fn main() {
    let _sentry = sentry::init((
        std::env::var("SENTRY_DSN").ok(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    ));

    tracing_subscriber::fmt()
        .with_target(false)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("0.0.0.0:{port}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: cannot bind {addr}: {e}");
            std::process::exit(1);
        });
    eprintln!("Listening on {addr}");
    if let Err(e) = axum::serve(listener, router()).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
