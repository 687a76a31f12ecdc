use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};

use bazaar_db::Database;
use bazaar_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};
use bazaar_types::models::User;

use crate::blocking;
use crate::directory::Directory;
use crate::error::{ApiError, ApiResult};
use crate::middleware::CurrentUser;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let user = blocking(move || {
        Directory::new(&db.db).register(&req.first_name, &req.last_name, &req.email, &req.password)
    })
    .await?;

    let token = create_token(&state.jwt_secret, &user)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let user = blocking(move || Directory::new(&db.db).verify_credentials(&req.email, &req.password))
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    let token = create_token(&state.jwt_secret, &user)?;
    Ok(Json(AuthResponse { user, token }))
}

pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<User> {
    Json(user)
}

pub async fn delete_me(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<StatusCode> {
    blocking(move || Directory::new(&state.db).delete_account(user.id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Sign a 30-day HS256 token naming `user`.
pub fn create_token(secret: &str, user: &User) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
