use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    // Foreign keys guard references only. Deletes walk the ownership edges
    // explicitly (see users::delete_user, products::delete_product).
    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                first_name  TEXT NOT NULL,
                last_name   TEXT NOT NULL,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL
            );

            CREATE TABLE products (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id     INTEGER NOT NULL REFERENCES users(id),
                name         TEXT NOT NULL,
                brand        TEXT NOT NULL DEFAULT '',
                category     TEXT NOT NULL DEFAULT '',
                price        REAL NOT NULL CHECK (price >= 0),
                description  TEXT NOT NULL DEFAULT '',
                image        BLOB,
                contact      TEXT NOT NULL DEFAULT '',
                address      TEXT NOT NULL DEFAULT '',
                created_at   INTEGER NOT NULL
            );

            CREATE INDEX idx_products_owner ON products(owner_id);
            CREATE INDEX idx_products_name ON products(name);

            CREATE TABLE messages (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                product_id   INTEGER NOT NULL REFERENCES products(id),
                sender_id    INTEGER NOT NULL REFERENCES users(id),
                receiver_id  INTEGER NOT NULL REFERENCES users(id),
                body         TEXT NOT NULL,
                created_at   INTEGER NOT NULL
            );

            CREATE INDEX idx_messages_product_receiver
                ON messages(product_id, receiver_id, created_at);
            CREATE INDEX idx_messages_sender ON messages(sender_id, created_at);
            CREATE INDEX idx_messages_receiver ON messages(receiver_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(applied, 1);
    }

    #[test]
    fn negative_price_is_rejected_by_schema() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (first_name, last_name, email, password) VALUES ('a', 'b', 'a@b.io', 'x')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO products (owner_id, name, price, created_at) VALUES (1, 'bike', -1, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
