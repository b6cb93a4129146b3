//! HTTP surface: the upgrade endpoint plus router composition.
//!
//! The adapter owns exactly one route, `GET /websocket`. Everything else
//! belongs to the embedding application's router and is composed with
//! [`Router::merge`]; the adapter never inspects those requests.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use tenvis_harbor_core::{ConnectContext, SessionFactory};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::actor::ActorNamespace;
use crate::bridge;
use crate::config::{Config, LimitsConfig};
use crate::metrics;

/// Actor identity used when a request does not name one.
pub const DEFAULT_ACTOR: &str = "default";

/// Body returned for a request to the upgrade endpoint that is not a
/// WebSocket upgrade.
const EXPECTED_WEBSOCKET: &str = "Expected websocket";

struct UpgradeState<F: SessionFactory> {
    namespace: ActorNamespace<F>,
    limits: LimitsConfig,
}

impl<F: SessionFactory> Clone for UpgradeState<F> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            limits: self.limits.clone(),
        }
    }
}

/// Build the adapter's router: `GET /websocket`, upgrading into the actor
/// named by the `actor` query parameter (or [`DEFAULT_ACTOR`]).
///
/// Compose with the application's own routes via [`Router::merge`]:
///
/// ```rust,ignore
/// let app = base_router(namespace).merge(my_routes());
/// ```
pub fn base_router<F: SessionFactory>(namespace: ActorNamespace<F>) -> Router {
    base_router_with_limits(namespace, LimitsConfig::default())
}

/// [`base_router`] with explicit resource limits.
pub fn base_router_with_limits<F: SessionFactory>(
    namespace: ActorNamespace<F>,
    limits: LimitsConfig,
) -> Router {
    Router::new()
        .route("/websocket", get(upgrade_handler::<F>))
        .with_state(UpgradeState { namespace, limits })
}

/// The upgrade handler.
///
/// A request without a WebSocket upgrade header is answered synchronously
/// with `400` and a fixed plain-text body. Once the upgrade is accepted the
/// response is committed; any later setup failure reaches the client as an
/// in-band error notice and a 1011 close, never as an HTTP error.
async fn upgrade_handler<F: SessionFactory>(
    State(state): State<UpgradeState<F>>,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Ok(ws) = ws else {
        return (StatusCode::BAD_REQUEST, EXPECTED_WEBSOCKET).into_response();
    };

    let mut ctx = ConnectContext::new(uri.to_string());
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            ctx.insert_header(name.as_str(), value);
        }
    }

    let actor_name = params
        .get("actor")
        .map(String::as_str)
        .unwrap_or(DEFAULT_ACTOR);
    let actor = state.namespace.get_or_spawn(actor_name);
    let max_message_size = state.limits.max_message_size;

    match actor.connect(ctx).await {
        Ok(client) => ws.on_upgrade(move |socket| bridge::run(socket, client, max_message_size)),
        Err(connect_error) => {
            error!(actor = actor_name, error = %connect_error, "Actor unavailable");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server<F: SessionFactory>(
    config: Config,
    namespace: ActorNamespace<F>,
    app: Router,
) -> anyhow::Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(metrics_error) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", metrics_error);
        }
    }

    let router = base_router_with_limits(namespace, config.limits.clone()).merge(app);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Harbor server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/websocket", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
