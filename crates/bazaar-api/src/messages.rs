use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use bazaar_types::api::{ConversationQuery, DeleteMessageResponse, SendMessageRequest};
use bazaar_types::models::{Message, User};

use crate::auth::AppState;
use crate::blocking;
use crate::catalog::Catalog;
use crate::conversations::Conversations;
use crate::directory::Directory;
use crate::error::{ApiError, ApiResult};
use crate::middleware::CurrentUser;

/// GET /products/{id}/messages — the product's chat history.
pub async fn product_messages(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = blocking(move || {
        Catalog::new(&state.db)
            .find_by_id(product_id)?
            .ok_or(ApiError::NotFound("Product"))?;
        Conversations::new(&state.db).messages_for_product(product_id)
    })
    .await?;
    Ok(Json(messages))
}

/// POST /products/{id}/messages — the receiver defaults to the product owner.
pub async fn send_message(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = blocking(move || {
        Conversations::new(&state.db).send(product_id, user.id, req.receiver_id, &req.body)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /messages — everything the caller sent or received.
pub async fn my_messages(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = blocking(move || Conversations::new(&state.db).messages_for_user(user.id)).await?;
    Ok(Json(messages))
}

/// GET /messages/inbox
pub async fn inbox(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages =
        blocking(move || Conversations::new(&state.db).messages_received_by(user.id)).await?;
    Ok(Json(messages))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<DeleteMessageResponse>> {
    let outcome =
        blocking(move || Conversations::new(&state.db).delete_message(message_id, user.id)).await?;
    Ok(Json(DeleteMessageResponse { outcome }))
}

/// GET /conversations — people the caller has exchanged messages with.
pub async fn partners(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<User>>> {
    let users =
        blocking(move || Conversations::new(&state.db).conversation_partners(user.id)).await?;
    Ok(Json(users))
}

/// GET /conversations/{user_id}[?product_id=] — the thread with one partner.
pub async fn conversation(
    State(state): State<AppState>,
    Path(other_id): Path<i64>,
    Query(query): Query<ConversationQuery>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = blocking(move || {
        Directory::new(&state.db)
            .find_by_id(other_id)?
            .ok_or(ApiError::NotFound("User"))?;

        let chat = Conversations::new(&state.db);
        match query.product_id {
            Some(product_id) => chat.conversation_for_product(user.id, other_id, product_id),
            None => chat.conversation(user.id, other_id),
        }
    })
    .await?;
    Ok(Json(messages))
}
