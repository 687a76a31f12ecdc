use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{debug, error};

use bazaar_types::api::Claims;
use bazaar_types::models::User;

use crate::auth::AppState;
use crate::blocking;
use crate::directory::Directory;

/// The authenticated caller, resolved from the token's subject.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Extract and validate the JWT from the Authorization header, then load
/// the account it names. Tokens for deleted accounts are rejected.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let user_id = token_data.claims.sub;
    let db = state.clone();
    let user = blocking(move || Directory::new(&db.db).find_by_id(user_id))
        .await
        .map_err(|e| {
            error!("Failed to resolve user {}: {}", user_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or_else(|| {
            debug!("Token for missing user {}", user_id);
            StatusCode::UNAUTHORIZED
        })?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
