//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the bazaar-types models so the password hash and the
//! on-disk timestamp format stay inside this crate.
use bazaar_types::models::{Message, Product, User};
use chrono::DateTime;
use tracing::warn;

pub struct UserRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

pub struct ProductRow {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub price: f64,
    pub description: String,
    pub contact: String,
    pub address: String,
    pub has_image: bool,
}

pub struct MessageRow {
    pub id: i64,
    pub product_id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub body: String,
    pub created_at: i64,
}

impl MessageRow {
    /// Whether `user_id` sent or received this message.
    pub fn involves(&self, user_id: i64) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }
}

/// Column values written on product insert and update.
/// On update an `image` of `None` keeps the stored blob.
pub struct ProductFields<'a> {
    pub name: &'a str,
    pub brand: &'a str,
    pub category: &'a str,
    pub price: f64,
    pub description: &'a str,
    pub contact: &'a str,
    pub address: &'a str,
    pub image: Option<&'a [u8]>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
        }
    }
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            brand: row.brand,
            category: row.category,
            price: row.price,
            description: row.description,
            contact: row.contact,
            address: row.address,
            has_image: row.has_image,
        }
    }
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        let created_at = DateTime::from_timestamp_micros(row.created_at).unwrap_or_else(|| {
            warn!("Corrupt created_at '{}' on message '{}'", row.created_at, row.id);
            DateTime::default()
        });

        Message {
            id: row.id,
            product_id: row.product_id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            body: row.body,
            created_at,
        }
    }
}
