//! Per-product chat between two users.
//!
//! A conversation is never stored. It is whatever messages currently exist
//! for a pair of users, and it disappears with its last message.

use anyhow::anyhow;
use tracing::{debug, info, warn};

use bazaar_db::{Database, messages, now_micros, products, users};
use bazaar_types::models::{DeleteOutcome, Message, User};

use crate::error::{ApiError, ApiResult};

pub struct Conversations<'a> {
    db: &'a Database,
}

impl<'a> Conversations<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn messages_for_product(&self, product_id: i64) -> ApiResult<Vec<Message>> {
        debug!("Fetching messages for product {}", product_id);
        Ok(into_messages(self.db.get_messages_by_product(product_id)?))
    }

    pub fn messages_for_product_and_receiver(
        &self,
        product_id: i64,
        receiver_id: i64,
    ) -> ApiResult<Vec<Message>> {
        let rows = self.db.get_messages_by_product_and_receiver(product_id, receiver_id)?;
        Ok(into_messages(rows))
    }

    pub fn messages_for_user(&self, user_id: i64) -> ApiResult<Vec<Message>> {
        debug!("Fetching messages for user {}", user_id);
        Ok(into_messages(self.db.get_messages_by_user(user_id)?))
    }

    pub fn messages_received_by(&self, user_id: i64) -> ApiResult<Vec<Message>> {
        Ok(into_messages(self.db.get_messages_by_receiver(user_id)?))
    }

    /// Everyone `user_id` has sent to or received from, once each.
    pub fn conversation_partners(&self, user_id: i64) -> ApiResult<Vec<User>> {
        let rows = self.db.get_conversation_partners(user_id)?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Both directions between the two users, across all products.
    pub fn conversation(&self, user_id: i64, other_id: i64) -> ApiResult<Vec<Message>> {
        debug!("Fetching conversation between {} and {}", user_id, other_id);
        Ok(into_messages(self.db.get_messages_between(user_id, other_id)?))
    }

    pub fn conversation_for_product(
        &self,
        user_id: i64,
        other_id: i64,
        product_id: i64,
    ) -> ApiResult<Vec<Message>> {
        let rows = self.db.get_messages_between_for_product(user_id, other_id, product_id)?;
        Ok(into_messages(rows))
    }

    /// Post `body` about a product. Without an explicit receiver the message
    /// goes to the product owner.
    pub fn send(
        &self,
        product_id: i64,
        sender_id: i64,
        receiver_id: Option<i64>,
        body: &str,
    ) -> ApiResult<Message> {
        let row = self.db.transaction(|tx| {
            let product = products::product_by_id(tx, product_id)?.ok_or(ApiError::NotFound("Product"))?;

            let receiver_id = match receiver_id {
                Some(id) => users::user_by_id(tx, id)?.ok_or(ApiError::NotFound("Receiver"))?.id,
                None => product.owner_id,
            };
            if receiver_id == sender_id {
                return Err(ApiError::Validation("Cannot send a message to yourself".into()));
            }

            let id = messages::insert_message(tx, product_id, sender_id, receiver_id, body, now_micros())?;
            messages::message_by_id(tx, id)?
                .ok_or_else(|| ApiError::Store(anyhow!("message {} vanished after insert", id)))
        })?;

        info!(
            "User {} messaged user {} about product {}",
            row.sender_id, row.receiver_id, row.product_id
        );
        Ok(Message::from(row))
    }

    /// Delete one message on behalf of its sender or receiver.
    ///
    /// Afterwards, if neither party has anything left addressed to them on
    /// that product, the conversation is gone and callers should leave the
    /// thread view.
    pub fn delete_message(&self, message_id: i64, requester_id: i64) -> ApiResult<DeleteOutcome> {
        let outcome = self.db.transaction(|tx| {
            let message = messages::message_by_id(tx, message_id)?.ok_or(ApiError::NotFound("Message"))?;

            if !message.involves(requester_id) {
                warn!(
                    "User {} tried to delete message {} between {} and {}",
                    requester_id, message_id, message.sender_id, message.receiver_id
                );
                return Err(ApiError::Unauthorized("delete this message"));
            }

            messages::delete_message(tx, message_id)?;

            let sender_left =
                messages::messages_by_product_and_receiver(tx, message.product_id, message.sender_id)?;
            let receiver_left =
                messages::messages_by_product_and_receiver(tx, message.product_id, message.receiver_id)?;

            Ok(if sender_left.is_empty() && receiver_left.is_empty() {
                DeleteOutcome::Extinguished
            } else {
                DeleteOutcome::Continues
            })
        })?;

        info!("User {} deleted message {} ({:?})", requester_id, message_id, outcome);
        Ok(outcome)
    }
}

fn into_messages(rows: Vec<bazaar_db::models::MessageRow>) -> Vec<Message> {
    rows.into_iter().map(Message::from).collect()
}
