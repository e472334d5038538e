use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::price_infra::cache::LatestValueCache;

pub mod auth;
pub mod hub;
pub mod rest;
pub mod websocket;

use auth::{api_key_middleware, ApiKeyAuth};
use hub::SubscriptionHub;

/// Everything a connection handler needs, shared across all sockets.
pub struct GatewayState {
    pub hub: Arc<SubscriptionHub>,
    pub cache: Arc<LatestValueCache>,
    pub auth: ApiKeyAuth,
}

impl GatewayState {
    pub fn new(hub: Arc<SubscriptionHub>, cache: Arc<LatestValueCache>, api_key: &str) -> Self {
        GatewayState {
            hub,
            cache,
            auth: ApiKeyAuth::new(api_key),
        }
    }
}

/// The socket route sits behind the token check; health and metrics do not.
pub fn create_router(state: Arc<GatewayState>, ws_path: &str) -> Router {
    let sockets = Router::new()
        .route(ws_path, get(websocket::websocket_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), api_key_middleware))
        .with_state(state);

    sockets
        .merge(rest::create_router())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(config: &GatewayConfig, state: Arc<GatewayState>) -> Result<()> {
    let router = create_router(state, &config.ws_path);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!(addr = %config.bind_addr, path = %config.ws_path, "Gateway listening");

    axum::serve(listener, router)
        .await
        .map_err(Error::IoError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn router() -> Router {
        let state = Arc::new(GatewayState::new(
            Arc::new(SubscriptionHub::new()),
            Arc::new(LatestValueCache::new()),
            "secret",
        ));
        create_router(state, "/cex")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_token_is_rejected() {
        let response = router().oneshot(get("/cex")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Invalid API Key");
    }

    #[tokio::test]
    async fn test_wrong_token_is_rejected() {
        let response = router().oneshot(get("/cex?token=nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_token_reaches_upgrade() {
        // A plain GET is not an upgrade, so the handler refuses it, but only
        // after the token check passed.
        let response = router().oneshot(get("/cex?token=secret")).await.unwrap();
        assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let response = router().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"OK");
    }
}
