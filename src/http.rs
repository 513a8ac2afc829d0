//! HTTP surface.
//!
//! The discharge router serves the bakery endpoints and the identity
//! provider login pages. Prometheus metrics are served separately on
//! their own port.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{HeaderMap, Method, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use bakery_proto::{BakeryVersion, PublicKey};
use serde::{Deserialize, Serialize};

use crate::discharge::{DischargeParams, responder};
use crate::error::DischargeError;
use crate::idp::{IdpContext, IdpRequest, html_escape};
use crate::state::SharedState;

#[derive(Serialize)]
struct PublicKeyBody {
    #[serde(rename = "PublicKey")]
    public_key: PublicKey,
}

#[derive(Serialize)]
struct InfoBody {
    #[serde(rename = "PublicKey")]
    public_key: PublicKey,
    #[serde(rename = "Version")]
    version: u8,
}

#[derive(Debug, Deserialize)]
struct TicketQuery {
    waitid: Option<String>,
    domain: Option<String>,
}

/// Build the discharge service router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/discharge", get(discharge).post(discharge))
        .route("/discharge/info", get(discharge_info))
        .route("/publickey", get(public_key))
        .route("/login", get(login_choice))
        .route("/login/:provider", get(login).post(login))
        .route("/wait", get(wait))
        .with_state(state)
}

/// Handler for /discharge.
async fn discharge(
    State(state): State<SharedState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = DischargeParams::parse(query.as_deref(), &body);
    responder::discharge(&state, &headers, &params).await
}

/// Handler for GET /publickey.
async fn public_key(State(state): State<SharedState>) -> Json<PublicKeyBody> {
    Json(PublicKeyBody {
        public_key: state.key.public_key(),
    })
}

/// Handler for GET /discharge/info.
async fn discharge_info(State(state): State<SharedState>) -> Json<InfoBody> {
    Json(InfoBody {
        public_key: state.key.public_key(),
        version: BakeryVersion::LATEST.as_u8(),
    })
}

/// Handler for GET /login: pick an identity provider.
async fn login_choice(
    State(state): State<SharedState>,
    Query(q): Query<TicketQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(waitid) = q.waitid.as_deref().filter(|w| !w.is_empty()) else {
        return DischargeError::MissingParameter("waitid").into_response();
    };
    let domain = q.domain.as_deref();
    let providers = state.providers_for_domain(domain);
    let login_url = |name: &str| state.url(&format!("/login/{name}"), waitid, domain);

    let wants_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    if wants_json {
        let methods: BTreeMap<&str, String> = providers
            .iter()
            .map(|p| (p.name(), login_url(p.name())))
            .collect();
        return Json(methods).into_response();
    }

    let interactive: Vec<_> = providers.into_iter().filter(|p| p.interactive()).collect();
    if let [only] = interactive.as_slice() {
        return Redirect::to(&login_url(only.name())).into_response();
    }
    let items: String = interactive
        .iter()
        .map(|p| {
            let label = if p.description().is_empty() {
                p.name()
            } else {
                p.description()
            };
            format!(
                "<li><a href=\"{}\">{}</a></li>\n",
                html_escape(&login_url(p.name())),
                html_escape(label)
            )
        })
        .collect();
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Log in</title></head>\n<body>\n\
         <h1>Log in with</h1>\n<ul>\n{items}</ul>\n</body>\n</html>\n"
    ))
    .into_response()
}

/// Handler for /login/:provider: dispatch to the identity provider.
async fn login(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(provider) = state.provider(&name).map(Arc::clone) else {
        return DischargeError::UnknownProvider(name).into_response();
    };
    let Some(waitid) = query.get("waitid").filter(|w| !w.is_empty()).cloned() else {
        return DischargeError::MissingParameter("waitid").into_response();
    };
    let login_url = state.url(
        &format!("/login/{name}"),
        &waitid,
        query.get("domain").map(String::as_str),
    );
    let ctx = IdpContext::new(Arc::clone(&state), name, Some(waitid), login_url);
    let req = IdpRequest {
        method,
        query,
        headers,
        body,
    };
    provider.handle(ctx, req).await
}

/// Handler for GET /wait.
async fn wait(
    State(state): State<SharedState>,
    Query(q): Query<TicketQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(waitid) = q.waitid.filter(|w| !w.is_empty()) else {
        return DischargeError::MissingParameter("waitid").into_response();
    };
    let timeout = state.timing.wait_timeout();
    responder::wait(&state, &headers, &waitid, timeout).await
}

/// Serve the discharge router until `shutdown` resolves.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: SharedState,
    shutdown: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Run the HTTP server for Prometheus metrics.
///
/// Binds to `0.0.0.0:port` and serves the `/metrics` endpoint.
/// This is a long-running task that should be spawned in the background.
pub async fn run_metrics_server(port: u16) {
    let app = Router::new().route("/metrics", get(metrics_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Prometheus HTTP server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind metrics server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Metrics server error: {}", e);
    }
}
