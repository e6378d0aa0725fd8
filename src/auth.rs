use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use axum_auth::AuthBearer;

use crate::error::{AppError, Result};
use crate::token::TokenManager;

/// Guards the `/api` routes. A request gets through only with a valid,
/// unexpired bearer token, and the decoded [`Claims`](crate::token::Claims)
/// travel with it as a request extension.
pub async fn require_token<B>(
    State(tokens): State<TokenManager>,
    bearer: Option<AuthBearer>,
    mut request: Request<B>,
    next: Next<B>,
) -> Result<Response> {
    // axum-auth rejects a missing header and a non "Bearer " scheme alike
    let AuthBearer(token) = bearer.ok_or(AppError::MissingToken)?;
    let claims = tokens.validate(&token)?;

    tracing::debug!("Authenticated request from {}", claims.username);
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
