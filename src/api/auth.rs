use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;
use crate::api::GatewayState;
use crate::error::{Error, Result};
use crate::observability::metrics::AUTH_REJECTIONS;

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Single shared API key, passed by clients as `?token=` on the upgrade URL.
pub struct ApiKeyAuth {
    api_key: String,
}

impl ApiKeyAuth {
    pub fn new(api_key: impl Into<String>) -> Self {
        ApiKeyAuth { api_key: api_key.into() }
    }

    pub fn verify(&self, token: Option<&str>) -> Result<()> {
        match token {
            Some(token) if !self.api_key.is_empty() && token == self.api_key => Ok(()),
            _ => Err(Error::Unauthorized),
        }
    }
}

/// Rejects the upgrade before any socket exists.
pub async fn api_key_middleware(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<TokenQuery>,
    request: Request,
    next: Next,
) -> Response {
    if let Err(e) = state.auth.verify(query.token.as_deref()) {
        AUTH_REJECTIONS.inc();
        tracing::info!(error = %e, path = %request.uri().path(), "Connection rejected");
        return (StatusCode::UNAUTHORIZED, "Invalid API Key").into_response();
    }

    next.run(request).await
}
