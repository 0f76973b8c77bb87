//! Passthrough relay: every inbound request, regardless of method or path,
//! is forwarded to the single configured downstream target and the
//! downstream response is returned unmodified. No retries, no rewriting.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use reqwest::Client;
use tracing::{error, info};

/// Connection-level headers that must not be forwarded in either direction.
const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

#[derive(Clone)]
pub struct RelayState {
    client: Client,
    target_url: String,
}

pub fn router(client: Client, target_url: String) -> Router {
    let target_url = target_url.trim_end_matches('/').to_string();
    Router::new().fallback(forward).with_state(RelayState { client, target_url })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    client: Client,
    target_url: String,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.relay.start",
        bind_address = %address,
        target_url = %target_url,
        "relay endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(client, target_url)).await {
            error!(
                event_name = "system.relay.error",
                error = %error,
                "relay server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

/// Exactly one outbound request per inbound request.
async fn forward(State(state): State<RelayState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let body_bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(error) => {
            return (StatusCode::BAD_REQUEST, format!("could not read request body: {error}"))
                .into_response();
        }
    };

    let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let url = format!("{}{}", state.target_url, path_and_query);

    let outbound = state
        .client
        .request(parts.method.clone(), &url)
        .headers(forwardable_headers(&parts.headers))
        .body(body_bytes)
        .send()
        .await;

    let downstream = match outbound {
        Ok(response) => response,
        Err(error) => {
            error!(error = %error, url = %url, "relay request to downstream target failed");
            return (StatusCode::BAD_GATEWAY, format!("relay target unreachable: {error}"))
                .into_response();
        }
    };

    let status = downstream.status();
    let headers = forwardable_headers(downstream.headers());
    let body = match downstream.bytes().await {
        Ok(bytes) => bytes,
        Err(error) => {
            return (
                StatusCode::BAD_GATEWAY,
                format!("relay target response could not be read: {error}"),
            )
                .into_response();
        }
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.iter().any(|hop| name.as_str().eq_ignore_ascii_case(hop))
}
