use anyhow::Result;
use bazaar_types::models::{PageRequest, ProductFilter, SearchScope};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use crate::models::{ProductFields, ProductRow};
use crate::{Database, fold_case, now_micros};

const PRODUCT_COLUMNS: &str = "id, owner_id, name, brand, category, price, description, contact, address, image IS NOT NULL";

impl Database {
    pub fn create_product(&self, owner_id: i64, fields: &ProductFields<'_>) -> Result<i64> {
        self.with_conn(|conn| insert_product(conn, owner_id, fields))
    }

    pub fn get_product(&self, id: i64) -> Result<Option<ProductRow>> {
        self.with_conn(|conn| product_by_id(conn, id))
    }

    pub fn get_products_by_owner(&self, owner_id: i64) -> Result<Vec<ProductRow>> {
        self.with_conn(|conn| products_by_owner(conn, owner_id))
    }

    pub fn search_products(
        &self,
        filter: &ProductFilter,
        scope: SearchScope,
        page: PageRequest,
    ) -> Result<(Vec<ProductRow>, u64)> {
        self.with_conn(|conn| search_products(conn, filter, scope, page))
    }

    pub fn get_product_image(&self, id: i64) -> Result<Option<Option<Vec<u8>>>> {
        self.with_conn(|conn| product_image(conn, id))
    }

    pub fn delete_product(&self, id: i64) -> Result<bool> {
        self.transaction(|tx| delete_product(tx, id))
    }
}

pub fn insert_product(conn: &Connection, owner_id: i64, fields: &ProductFields<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO products
            (owner_id, name, brand, category, price, description, contact, address, image, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            owner_id,
            fields.name,
            fields.brand,
            fields.category,
            fields.price,
            fields.description,
            fields.contact,
            fields.address,
            fields.image,
            now_micros(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn product_by_id(conn: &Connection, id: i64) -> Result<Option<ProductRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"))?;
    let row = stmt.query_row([id], product_row).optional()?;
    Ok(row)
}

pub fn products_by_owner(conn: &Connection, owner_id: i64) -> Result<Vec<ProductRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE owner_id = ?1 ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([owner_id], product_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Filtered, name-ordered page of products plus the total match count.
///
/// Category and name are case-insensitive substring matches with LIKE
/// wildcards in the input taken literally; price is an inclusive range.
pub fn search_products(
    conn: &Connection,
    filter: &ProductFilter,
    scope: SearchScope,
    page: PageRequest,
) -> Result<(Vec<ProductRow>, u64)> {
    let (owner_clause, owner_id) = match scope {
        SearchScope::OwnedBy(id) => ("owner_id = ?1", id),
        SearchScope::ExcludingOwner(id) => ("owner_id != ?1", id),
    };
    let where_clause = format!(
        "{owner_clause}
           AND fold_case(category) LIKE ?2 ESCAPE '\\'
           AND fold_case(name) LIKE ?3 ESCAPE '\\'
           AND price >= ?4
           AND (?5 IS NULL OR price <= ?5)"
    );

    let category = contains_pattern(&filter.category);
    let name = contains_pattern(&filter.query);

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM products WHERE {where_clause}"),
        params![owner_id, category, name, filter.min_price, filter.max_price],
        |r| r.get(0),
    )?;

    let total = total.max(0) as u64;

    // A page past what SQLite can address is past the end of any result set.
    let Ok(offset) = i64::try_from(page.offset()) else {
        return Ok((Vec::new(), total));
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE {where_clause}
         ORDER BY name ASC, id ASC
         LIMIT ?6 OFFSET ?7"
    ))?;
    let rows = stmt
        .query_map(
            params![
                owner_id,
                category,
                name,
                filter.min_price,
                filter.max_price,
                i64::from(page.size),
                offset,
            ],
            product_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((rows, total))
}

/// Overwrite every editable column; the image only when one is supplied.
pub fn update_product(conn: &Connection, id: i64, fields: &ProductFields<'_>) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE products
         SET name = ?2, brand = ?3, category = ?4, price = ?5, description = ?6,
             contact = ?7, address = ?8, image = COALESCE(?9, image)
         WHERE id = ?1",
        params![
            id,
            fields.name,
            fields.brand,
            fields.category,
            fields.price,
            fields.description,
            fields.contact,
            fields.address,
            fields.image,
        ],
    )?;
    Ok(changed > 0)
}

/// Messages first, then the product. Call inside a transaction.
pub fn delete_product(conn: &Connection, id: i64) -> Result<bool> {
    let messages = conn.execute("DELETE FROM messages WHERE product_id = ?1", [id])?;
    let deleted = conn.execute("DELETE FROM products WHERE id = ?1", [id])? > 0;

    if deleted {
        info!("Deleted product {} with {} messages", id, messages);
    }
    Ok(deleted)
}

/// Outer `None`: no such product. Inner `None`: product without an image.
pub fn product_image(conn: &Connection, id: i64) -> Result<Option<Option<Vec<u8>>>> {
    let image = conn
        .query_row("SELECT image FROM products WHERE id = ?1", [id], |r| r.get(0))
        .optional()?;
    Ok(image)
}

fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in fold_case(needle).chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn product_row(row: &Row<'_>) -> rusqlite::Result<ProductRow> {
    Ok(ProductRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        brand: row.get(3)?,
        category: row.get(4)?,
        price: row.get(5)?,
        description: row.get(6)?,
        contact: row.get(7)?,
        address: row.get(8)?,
        has_image: row.get(9)?,
    })
}
