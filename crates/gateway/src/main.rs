//! RuleForge API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Explain streams over Server-Sent Events
//! - Rulebook chunk indexing and document deletion
//! - Observability (logging, metrics)

mod handlers;

use anyhow::Context;
use axum::{
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use ruleforge_common::{
    config::{AppConfig, ObservabilityConfig},
    embeddings::create_embedder,
    metrics,
};
use ruleforge_explain::{ExplainOptions, ExplainService};
use ruleforge_search::{create_store, VectorStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub explain: ExplainService,
    pub store: Arc<dyn VectorStore>,
    /// Parent of every explain stream token; cancelled on shutdown
    pub shutdown: CancellationToken,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match std::env::var("APP_CONFIG_FILE") {
        Ok(path) => AppConfig::from_file(&path),
        Err(_) => AppConfig::load(),
    }
    .context("failed to load configuration")?;

    init_tracing(&config.observability);
    info!("Starting RuleForge API Gateway v{}", ruleforge_common::VERSION);

    // Initialize metrics
    init_metrics(&config.observability)?;
    metrics::register_metrics();

    let config = Arc::new(config);

    let embedder = create_embedder(&config.embedding).context("failed to create embedder")?;
    let store = create_store(&config.vector_store, embedder.dimension())
        .context("failed to create vector store")?;

    info!(
        backend = store.backend(),
        collection = %config.vector_store.collection,
        model = embedder.model_name(),
        "Ensuring vector collection..."
    );
    store
        .ensure_collection()
        .await
        .context("failed to ensure vector collection")?;

    let shutdown = CancellationToken::new();
    let state = AppState {
        explain: ExplainService::new(
            embedder,
            Arc::clone(&store),
            ExplainOptions::from(&config.explain),
        ),
        store,
        config: config.clone(),
        shutdown: shutdown.clone(),
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown, config.shutdown_timeout()))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Install the Prometheus recorder; a zero port disables export
fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_embedding_duration_seconds", metrics::METRICS_PREFIX)),
            metrics::EMBEDDING_BUCKETS,
        )?
        .set_buckets(metrics::LATENCY_BUCKETS)?
        .install()
        .context("failed to install Prometheus exporter")?;

    info!(port = config.metrics_port, "Prometheus exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        .route("/games/{game_id}/explain", get(handlers::explain::explain))
        .route(
            "/games/{game_id}/documents/{pdf_id}/chunks",
            post(handlers::documents::index_chunks),
        )
        .route("/documents/{pdf_id}", delete(handlers::documents::delete_document));

    // Compose the app
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
///
/// Open explain streams are cancelled so their connections can drain.
async fn shutdown_signal(shutdown: CancellationToken, drain_timeout: std::time::Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }

    shutdown.cancel();

    // Bound how long draining connections may hold the process
    tokio::spawn(async move {
        tokio::time::sleep(drain_timeout).await;
        warn!(timeout_secs = drain_timeout.as_secs(), "Shutdown drain timed out, exiting");
        std::process::exit(1);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use ruleforge_common::embeddings::MockEmbedder;
    use ruleforge_search::InMemoryVectorStore;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const DIM: usize = 32;

    async fn test_state() -> (AppState, Arc<MockEmbedder>) {
        let embedder = Arc::new(MockEmbedder::new(DIM));
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new(DIM));
        tokio_test::assert_ok!(store.ensure_collection().await);

        let state = AppState {
            config: Arc::new(AppConfig::default()),
            explain: ExplainService::new(
                embedder.clone(),
                Arc::clone(&store),
                ExplainOptions::default(),
            ),
            store,
            shutdown: CancellationToken::new(),
        };
        (state, embedder)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn chunks_body(embedder: &MockEmbedder, texts: &[&str]) -> Body {
        let chunks: Vec<Value> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                json!({
                    "text": text,
                    "embedding": embedder.vector_for(text),
                    "page": i + 1,
                    "charStart": 0,
                    "charEnd": text.len(),
                })
            })
            .collect();
        Body::from(json!({ "chunks": chunks }).to_string())
    }

    fn index_request(game_id: &str, pdf_id: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/v1/games/{}/documents/{}/chunks", game_id, pdf_id))
            .header("content-type", "application/json")
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = test_state().await;
        let response = create_router(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_reports_vector_store() {
        let (state, _) = test_state().await;
        let response = create_router(state)
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["checks"]["vector_store"]["status"], "up");
    }

    #[tokio::test]
    async fn test_ready_fails_without_collection() {
        let (mut state, _) = test_state().await;
        state.store = Arc::new(InMemoryVectorStore::new(DIM));

        let response = create_router(state)
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["status"], "not_ready");
    }

    #[tokio::test]
    async fn test_index_then_explain_streams_events() {
        let (state, embedder) = test_state().await;
        let app = create_router(state);

        let texts = [
            "Each player starts with 1500 dollars.",
            "Passing GO collects 200 dollars.",
        ];
        let response = app
            .clone()
            .oneshot(index_request("monopoly", "rules-1", chunks_body(&embedder, &texts)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["indexedCount"], 2);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/games/monopoly/explain?topic=passing%20GO")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let text = body_text(response).await;
        let citations = text.find("event: Citations").unwrap();
        let outline = text.find("event: Outline").unwrap();
        let complete = text.find("event: Complete").unwrap();
        assert!(text.starts_with("event: StateUpdate"));
        assert!(citations < outline && outline < complete);
        assert!(text.contains("\"source\":\"PDF:rules-1\""));
        assert!(!text.contains("event: Error"));
    }

    #[tokio::test]
    async fn test_explain_without_topic_streams_empty_topic_error() {
        let (state, _) = test_state().await;
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri("/v1/games/chess/explain")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.starts_with("event: Error"));
        assert!(text.contains("EMPTY_TOPIC"));
        assert!(!text.contains("event: StateUpdate"));
    }

    #[tokio::test]
    async fn test_explain_for_unindexed_game_is_no_results() {
        let (state, _) = test_state().await;
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri("/v1/games/catan/explain?topic=robber")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let text = body_text(response).await;
        assert_eq!(text.matches("event: StateUpdate").count(), 2);
        assert!(text.contains("NO_RESULTS"));
    }

    #[tokio::test]
    async fn test_shutdown_ends_explain_streams() {
        let (state, _) = test_state().await;
        state.shutdown.cancel();

        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri("/v1/games/chess/explain?topic=castling")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(body_text(response).await, "");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (state, embedder) = test_state().await;
        let app = create_router(state.clone());

        app.clone()
            .oneshot(index_request("chess", "chess-rules", chunks_body(&embedder, &["Castling"])))
            .await
            .unwrap();

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("DELETE")
                        .uri("/v1/documents/chess-rules")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await["success"], true);
        }

        let results = state
            .store
            .search("chess", &embedder.vector_for("Castling"), 10)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_index_rejects_wrong_dimension() {
        let (state, _) = test_state().await;
        let body = json!({
            "chunks": [{
                "text": "Short vector",
                "embedding": [0.1, 0.2],
                "page": 1,
                "charStart": 0,
                "charEnd": 12,
            }]
        });

        let response = create_router(state)
            .oneshot(index_request("chess", "rules-1", Body::from(body.to_string())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["indexedCount"], 0);
        assert!(body["error"].as_str().unwrap().contains("dimension"));
    }

    #[tokio::test]
    async fn test_overlong_game_id_is_rejected() {
        let (state, _) = test_state().await;
        let game_id = "g".repeat(129);
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/games/{}/explain?topic=setup", game_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");
    }
}
