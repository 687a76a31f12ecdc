mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use bazaar_api::auth::{self, AppState, AppStateInner};
use bazaar_api::messages;
use bazaar_api::middleware::require_auth;
use bazaar_api::products;
use bazaar_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "bazaar=debug,bazaar_api=debug,bazaar_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    let db = Database::open(&config.db_path)?;
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
    });

    let app = routes(state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(config.request_timeout))
                .layer(CorsLayer::permissive()),
        );

    let addr: SocketAddr = config.server_address().parse()?;
    info!("Bazaar server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Every endpoint, with the token check on all but register and login.
fn routes(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/me", get(auth::me).delete(auth::delete_me))
        .route("/me/products", get(products::list_owned))
        .route("/products", get(products::browse).post(products::create_product))
        .route("/products/mine", get(products::mine))
        .route(
            "/products/{id}",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route("/products/{id}/image", get(products::product_image))
        .route(
            "/products/{id}/messages",
            get(messages::product_messages).post(messages::send_message),
        )
        .route("/messages", get(messages::my_messages))
        .route("/messages/inbox", get(messages::inbox))
        .route("/messages/{id}", delete(messages::delete_message))
        .route("/conversations", get(messages::partners))
        .route("/conversations/{user_id}", get(messages::conversation))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    fn app() -> (Router, AppState) {
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: SECRET.into(),
        });
        (routes(state.clone()), state)
    }

    fn get_me(token: Option<&str>) -> Request<Body> {
        let mut req = Request::builder().uri("/me");
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        req.body(Body::empty()).unwrap()
    }

    fn token_for(state: &AppState, user_id: i64) -> String {
        let user = bazaar_types::models::User::from(state.db.get_user_by_id(user_id).unwrap().unwrap());
        auth::create_token(SECRET, &user).unwrap()
    }

    #[tokio::test]
    async fn missing_or_malformed_token_is_unauthorized() {
        let (app, _) = app();

        let res = app.clone().oneshot(get_me(None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app.clone().oneshot(get_me(Some("not-a-jwt"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let basic = Request::builder()
            .uri("/me")
            .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(basic).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_signed_with_other_secret_is_unauthorized() {
        let (app, state) = app();
        let id = state.db.create_user("Ann", "Lee", "ann@example.com", "h").unwrap();
        let user = bazaar_types::models::User::from(state.db.get_user_by_id(id).unwrap().unwrap());
        let forged = auth::create_token("some-other-secret", &user).unwrap();

        let res = app.oneshot(get_me(Some(&forged))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_token_resolves_current_user() {
        let (app, state) = app();
        let id = state.db.create_user("Ann", "Lee", "ann@example.com", "h").unwrap();
        let token = token_for(&state, id);

        let res = app.oneshot(get_me(Some(&token))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let me: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(me["id"], id);
        assert_eq!(me["email"], "ann@example.com");
    }

    #[tokio::test]
    async fn token_for_deleted_account_is_rejected() {
        let (app, state) = app();
        let id = state.db.create_user("Ann", "Lee", "ann@example.com", "h").unwrap();
        let token = token_for(&state, id);
        state.db.delete_user(id).unwrap();

        let res = app.clone().oneshot(get_me(Some(&token))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let products = Request::builder()
            .uri("/products")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(products).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_issues_a_usable_token() {
        let (app, _) = app();
        let register = Request::builder()
            .method("POST")
            .uri("/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({
                    "first_name": "Ann",
                    "last_name": "Lee",
                    "email": "ann@example.com",
                    "password": "hunter22",
                })
                .to_string(),
            ))
            .unwrap();

        let res = app.clone().oneshot(register).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let auth: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let token = auth["token"].as_str().unwrap();

        let res = app.oneshot(get_me(Some(token))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
