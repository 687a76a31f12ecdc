use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Params, Row, params};

use crate::models::{MessageRow, UserRow};
use crate::users::user_row;
use crate::{Database, now_micros};

const MESSAGE_COLUMNS: &str = "id, product_id, sender_id, receiver_id, body, created_at";

// Every message listing is chronological; the id breaks timestamp ties so
// equal timestamps come back in insertion order.
const CHRONOLOGICAL: &str = "ORDER BY created_at ASC, id ASC";

impl Database {
    pub fn create_message(
        &self,
        product_id: i64,
        sender_id: i64,
        receiver_id: i64,
        body: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            insert_message(conn, product_id, sender_id, receiver_id, body, now_micros())
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| message_by_id(conn, id))
    }

    pub fn get_messages_by_product(&self, product_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| messages_by_product(conn, product_id))
    }

    pub fn get_messages_by_product_and_receiver(
        &self,
        product_id: i64,
        receiver_id: i64,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| messages_by_product_and_receiver(conn, product_id, receiver_id))
    }

    pub fn get_messages_by_receiver(&self, receiver_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| messages_by_receiver(conn, receiver_id))
    }

    pub fn get_messages_by_user(&self, user_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| messages_by_user(conn, user_id))
    }

    pub fn get_messages_between(&self, a: i64, b: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| messages_between(conn, a, b))
    }

    pub fn get_messages_between_for_product(
        &self,
        a: i64,
        b: i64,
        product_id: i64,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| messages_between_for_product(conn, a, b, product_id))
    }

    pub fn get_conversation_partners(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| conversation_partners(conn, user_id))
    }
}

pub fn insert_message(
    conn: &Connection,
    product_id: i64,
    sender_id: i64,
    receiver_id: i64,
    body: &str,
    created_at: i64,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO messages (product_id, sender_id, receiver_id, body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![product_id, sender_id, receiver_id, body, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn message_by_id(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"))?;
    let row = stmt.query_row([id], message_row).optional()?;
    Ok(row)
}

pub fn delete_message(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.execute("DELETE FROM messages WHERE id = ?1", [id])? > 0)
}

pub fn messages_by_product(conn: &Connection, product_id: i64) -> Result<Vec<MessageRow>> {
    query_messages(conn, "product_id = ?1", [product_id])
}

pub fn messages_by_product_and_receiver(
    conn: &Connection,
    product_id: i64,
    receiver_id: i64,
) -> Result<Vec<MessageRow>> {
    query_messages(
        conn,
        "product_id = ?1 AND receiver_id = ?2",
        [product_id, receiver_id],
    )
}

pub fn messages_by_receiver(conn: &Connection, receiver_id: i64) -> Result<Vec<MessageRow>> {
    query_messages(conn, "receiver_id = ?1", [receiver_id])
}

pub fn messages_by_user(conn: &Connection, user_id: i64) -> Result<Vec<MessageRow>> {
    query_messages(conn, "sender_id = ?1 OR receiver_id = ?1", [user_id])
}

/// Both directions between two users, across every product.
pub fn messages_between(conn: &Connection, a: i64, b: i64) -> Result<Vec<MessageRow>> {
    query_messages(
        conn,
        "(sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)",
        [a, b],
    )
}

pub fn messages_between_for_product(
    conn: &Connection,
    a: i64,
    b: i64,
    product_id: i64,
) -> Result<Vec<MessageRow>> {
    query_messages(
        conn,
        "product_id = ?3
         AND ((sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1))",
        [a, b, product_id],
    )
}

/// Distinct users who sent to, or received from, `user_id`.
pub fn conversation_partners(conn: &Connection, user_id: i64) -> Result<Vec<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, email, password FROM users
         WHERE id IN (
             SELECT sender_id FROM messages WHERE receiver_id = ?1
             UNION
             SELECT receiver_id FROM messages WHERE sender_id = ?1
         )
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map([user_id], user_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_messages<P: Params>(conn: &Connection, filter: &str, params: P) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {filter} {CHRONOLOGICAL}"
    ))?;
    let rows = stmt
        .query_map(params, message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        product_id: row.get(1)?,
        sender_id: row.get(2)?,
        receiver_id: row.get(3)?,
        body: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductFields;

    struct Fixture {
        db: Database,
        alice: i64,
        bob: i64,
        carol: i64,
        bike: i64,
        lamp: i64,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("Alice", "A", "alice@example.com", "h").unwrap();
        let bob = db.create_user("Bob", "B", "bob@example.com", "h").unwrap();
        let carol = db.create_user("Carol", "C", "carol@example.com", "h").unwrap();
        let bike = db.create_product(alice, &product("bike")).unwrap();
        let lamp = db.create_product(alice, &product("lamp")).unwrap();
        Fixture { db, alice, bob, carol, bike, lamp }
    }

    fn product(name: &str) -> ProductFields<'_> {
        ProductFields {
            name,
            brand: "",
            category: "",
            price: 1.0,
            description: "",
            contact: "",
            address: "",
            image: None,
        }
    }

    fn insert_at(f: &Fixture, product: i64, from: i64, to: i64, at: i64) -> i64 {
        f.db.with_conn(|conn| insert_message(conn, product, from, to, "x", at))
            .unwrap()
    }

    fn ids(rows: Vec<MessageRow>) -> Vec<i64> {
        rows.into_iter().map(|r| r.id).collect()
    }

    #[test]
    fn listings_are_chronological_with_id_tiebreak() {
        let f = fixture();
        let late = insert_at(&f, f.bike, f.bob, f.alice, 300);
        let early = insert_at(&f, f.bike, f.alice, f.bob, 100);
        let tie_a = insert_at(&f, f.bike, f.bob, f.alice, 200);
        let tie_b = insert_at(&f, f.bike, f.alice, f.bob, 200);

        assert_eq!(
            ids(f.db.get_messages_by_product(f.bike).unwrap()),
            vec![early, tie_a, tie_b, late]
        );
    }

    #[test]
    fn between_covers_both_directions_across_products() {
        let f = fixture();
        let a = insert_at(&f, f.bike, f.bob, f.alice, 1);
        let b = insert_at(&f, f.lamp, f.alice, f.bob, 2);
        insert_at(&f, f.bike, f.carol, f.alice, 3);

        assert_eq!(ids(f.db.get_messages_between(f.alice, f.bob).unwrap()), vec![a, b]);
        assert_eq!(
            ids(f.db.get_messages_between_for_product(f.alice, f.bob, f.lamp).unwrap()),
            vec![b]
        );
    }

    #[test]
    fn receiver_and_user_views() {
        let f = fixture();
        let to_alice = insert_at(&f, f.bike, f.bob, f.alice, 1);
        let from_alice = insert_at(&f, f.bike, f.alice, f.bob, 2);
        let carol_to_alice = insert_at(&f, f.lamp, f.carol, f.alice, 3);

        assert_eq!(
            ids(f.db.get_messages_by_receiver(f.alice).unwrap()),
            vec![to_alice, carol_to_alice]
        );
        assert_eq!(
            ids(f.db.get_messages_by_user(f.bob).unwrap()),
            vec![to_alice, from_alice]
        );
        assert_eq!(
            ids(f.db.get_messages_by_product_and_receiver(f.bike, f.bob).unwrap()),
            vec![from_alice]
        );
    }

    #[test]
    fn partners_are_distinct() {
        let f = fixture();
        for at in 0..5 {
            insert_at(&f, f.bike, f.bob, f.alice, at);
            insert_at(&f, f.bike, f.alice, f.bob, at);
        }
        insert_at(&f, f.lamp, f.alice, f.carol, 10);

        let partners: Vec<i64> = f
            .db
            .get_conversation_partners(f.alice)
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(partners, vec![f.bob, f.carol]);

        let bobs: Vec<i64> = f
            .db
            .get_conversation_partners(f.bob)
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(bobs, vec![f.alice]);
    }

    #[test]
    fn delete_reports_whether_a_row_went_away() {
        let f = fixture();
        let id = insert_at(&f, f.bike, f.bob, f.alice, 1);
        assert!(f.db.with_conn(|conn| delete_message(conn, id)).unwrap());
        assert!(!f.db.with_conn(|conn| delete_message(conn, id)).unwrap());
        assert!(f.db.get_message(id).unwrap().is_none());
    }
}
