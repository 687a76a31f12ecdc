use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::info;

use crate::Database;
use crate::models::UserRow;

const USER_COLUMNS: &str = "id, first_name, last_name, email, password";

impl Database {
    pub fn create_user(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| insert_user(conn, first_name, last_name, email, password_hash))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| user_by_email(conn, email))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| user_by_id(conn, id))
    }

    /// Delete a user with everything hanging off them. Returns false when
    /// there was no such user.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        self.transaction(|tx| delete_user(tx, id))
    }
}

pub fn insert_user(
    conn: &Connection,
    first_name: &str,
    last_name: &str,
    email: &str,
    password_hash: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (first_name, last_name, email, password) VALUES (?1, ?2, ?3, ?4)",
        (first_name, last_name, email, password_hash),
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"))?;
    let row = stmt.query_row([email], user_row).optional()?;
    Ok(row)
}

pub fn user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;
    let row = stmt.query_row([id], user_row).optional()?;
    Ok(row)
}

/// Cascade order: messages the user sent or received, messages on the
/// user's products, the products, then the user. Call inside a transaction.
pub fn delete_user(conn: &Connection, id: i64) -> Result<bool> {
    let messages = conn.execute(
        "DELETE FROM messages
         WHERE sender_id = ?1
            OR receiver_id = ?1
            OR product_id IN (SELECT id FROM products WHERE owner_id = ?1)",
        [id],
    )?;
    let products = conn.execute("DELETE FROM products WHERE owner_id = ?1", [id])?;
    let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0;

    if deleted {
        info!(
            "Deleted user {} with {} products and {} messages",
            id, products, messages
        );
    }
    Ok(deleted)
}

pub(crate) fn user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        password: row.get(4)?,
    })
}
