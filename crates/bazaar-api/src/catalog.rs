use anyhow::anyhow;
use tracing::{debug, info, warn};

use bazaar_db::models::ProductFields;
use bazaar_db::{Connection, Database, products};
use bazaar_types::models::{Page, PageRequest, Product, ProductFilter, SearchScope};

use crate::error::{ApiError, ApiResult};

/// Editable product fields, used for both create and update.
#[derive(Debug, Clone, Default)]
pub struct ProductDraft {
    pub name: String,
    pub brand: String,
    pub category: String,
    pub price: f64,
    pub description: String,
    pub contact: String,
    pub address: String,
    /// An empty blob counts as no image.
    pub image: Option<Vec<u8>>,
}

impl ProductDraft {
    fn validate(&self) -> ApiResult<()> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("Product name is mandatory".into()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(ApiError::Validation("Price must be a non-negative number".into()));
        }

        let limits = [
            ("name", &self.name, 100),
            ("brand", &self.brand, 100),
            ("category", &self.category, 50),
            ("description", &self.description, 500),
            ("contact", &self.contact, 50),
            ("address", &self.address, 255),
        ];
        for (field, value, max) in limits {
            if value.chars().count() > max {
                return Err(ApiError::Validation(format!(
                    "{} must be at most {} characters",
                    field, max
                )));
            }
        }
        Ok(())
    }

    fn fields(&self) -> ProductFields<'_> {
        ProductFields {
            name: &self.name,
            brand: &self.brand,
            category: &self.category,
            price: self.price,
            description: &self.description,
            contact: &self.contact,
            address: &self.address,
            image: self.image.as_deref().filter(|bytes| !bytes.is_empty()),
        }
    }
}

/// Product listings: lookup, search, and owner-only mutation.
pub struct Catalog<'a> {
    db: &'a Database,
}

impl<'a> Catalog<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn list_for_owner(&self, owner_id: i64) -> ApiResult<Vec<Product>> {
        let rows = self.db.get_products_by_owner(owner_id)?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    pub fn find_by_id(&self, id: i64) -> ApiResult<Option<Product>> {
        Ok(self.db.get_product(id)?.map(Product::from))
    }

    pub fn search(
        &self,
        filter: &ProductFilter,
        scope: SearchScope,
        page: PageRequest,
    ) -> ApiResult<Page<Product>> {
        if page.size == 0 {
            return Err(ApiError::Validation("Page size must be positive".into()));
        }
        let max_ok = filter.max_price.is_none_or(|max| !max.is_nan());
        if filter.min_price.is_nan() || !max_ok {
            return Err(ApiError::Validation("Price bounds must be numbers".into()));
        }

        debug!(?scope, page = page.page, size = page.size, "Searching products");
        let (rows, total) = self.db.search_products(filter, scope, page)?;
        Ok(Page::new(rows, page, total).map(Product::from))
    }

    pub fn create(&self, draft: &ProductDraft, owner_id: i64) -> ApiResult<Product> {
        draft.validate()?;

        let id = self.db.create_product(owner_id, &draft.fields())?;
        info!("User {} listed product {}", owner_id, id);

        self.find_by_id(id)?
            .ok_or_else(|| ApiError::Store(anyhow!("product {} vanished after insert", id)))
    }

    /// Overwrite every field from `draft`; the stored image survives when the
    /// draft carries none. Only the owner may do this.
    pub fn update(&self, id: i64, draft: &ProductDraft, requester_id: i64) -> ApiResult<Product> {
        draft.validate()?;

        let row = self.db.transaction(|tx| {
            authorize_owner(tx, id, requester_id, "update this product")?;
            products::update_product(tx, id, &draft.fields())?;
            products::product_by_id(tx, id)?
                .ok_or_else(|| ApiError::Store(anyhow!("product {} vanished during update", id)))
        })?;

        info!("User {} updated product {}", requester_id, id);
        Ok(Product::from(row))
    }

    /// Delete a product and its messages. Only the owner may do this.
    pub fn delete(&self, id: i64, requester_id: i64) -> ApiResult<()> {
        self.db.transaction(|tx| {
            authorize_owner(tx, id, requester_id, "delete this product")?;
            products::delete_product(tx, id)?;
            Ok::<_, ApiError>(())
        })?;

        info!("User {} deleted product {}", requester_id, id);
        Ok(())
    }

    /// Raw image bytes, `None` when the product has no image.
    pub fn image(&self, id: i64) -> ApiResult<Option<Vec<u8>>> {
        self.db
            .get_product_image(id)?
            .ok_or(ApiError::NotFound("Product"))
    }
}

fn authorize_owner(
    conn: &Connection,
    id: i64,
    requester_id: i64,
    action: &'static str,
) -> ApiResult<()> {
    let existing = products::product_by_id(conn, id)?.ok_or(ApiError::NotFound("Product"))?;
    if existing.owner_id != requester_id {
        warn!(
            "User {} tried to {} (product {} owned by {})",
            requester_id, action, id, existing.owner_id
        );
        return Err(ApiError::Unauthorized(action));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        db: Database,
        owner: i64,
        stranger: i64,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let owner = db.create_user("O", "Wner", "owner@example.com", "h").unwrap();
        let stranger = db.create_user("S", "Tranger", "stranger@example.com", "h").unwrap();
        Fixture { db, owner, stranger }
    }

    fn draft(name: &str, price: f64) -> ProductDraft {
        ProductDraft {
            name: name.into(),
            brand: "Acme".into(),
            category: "Electronics".into(),
            price,
            description: "works".into(),
            contact: "555-0100".into(),
            address: "Main St".into(),
            image: None,
        }
    }

    fn everything() -> ProductFilter {
        ProductFilter::default()
    }

    #[test]
    fn create_assigns_owner() {
        let f = fixture();
        let catalog = Catalog::new(&f.db);
        let product = catalog.create(&draft("Radio", 500.0), f.owner).unwrap();

        assert_eq!(product.owner_id, f.owner);
        assert!(!product.has_image);
        assert_eq!(catalog.list_for_owner(f.owner).unwrap(), vec![product.clone()]);
        assert!(catalog.list_for_owner(f.stranger).unwrap().is_empty());
        assert_eq!(catalog.find_by_id(product.id).unwrap(), Some(product));
    }

    #[test]
    fn create_rejects_invalid_drafts() {
        let f = fixture();
        let catalog = Catalog::new(&f.db);

        for bad in [
            draft("", 1.0),
            draft("Radio", -1.0),
            draft("Radio", f64::NAN),
            ProductDraft { category: "c".repeat(51), ..draft("Radio", 1.0) },
        ] {
            assert!(matches!(catalog.create(&bad, f.owner), Err(ApiError::Validation(_))));
        }
        assert!(catalog.list_for_owner(f.owner).unwrap().is_empty());
    }

    #[test]
    fn update_by_stranger_is_refused_and_leaves_product_unchanged() {
        let f = fixture();
        let catalog = Catalog::new(&f.db);
        let product = catalog.create(&draft("Radio", 500.0), f.owner).unwrap();

        let result = catalog.update(product.id, &draft("Stolen", 1.0), f.stranger);
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
        assert_eq!(catalog.find_by_id(product.id).unwrap(), Some(product));
    }

    #[test]
    fn update_overwrites_fields_and_keeps_image() {
        let f = fixture();
        let catalog = Catalog::new(&f.db);
        let with_image = ProductDraft { image: Some(vec![0xff, 0xd8]), ..draft("Radio", 500.0) };
        let product = catalog.create(&with_image, f.owner).unwrap();
        assert!(product.has_image);

        // Empty replacement counts as "no new image".
        let patch = ProductDraft { image: Some(vec![]), brand: "Other".into(), ..draft("Radio v2", 450.0) };
        let updated = catalog.update(product.id, &patch, f.owner).unwrap();

        assert_eq!(updated.name, "Radio v2");
        assert_eq!(updated.brand, "Other");
        assert_eq!(updated.price, 450.0);
        assert!(updated.has_image);
        assert_eq!(catalog.image(product.id).unwrap(), Some(vec![0xff, 0xd8]));

        let replaced = ProductDraft { image: Some(vec![1]), ..draft("Radio v2", 450.0) };
        catalog.update(product.id, &replaced, f.owner).unwrap();
        assert_eq!(catalog.image(product.id).unwrap(), Some(vec![1]));
    }

    #[test]
    fn update_and_delete_missing_product() {
        let f = fixture();
        let catalog = Catalog::new(&f.db);

        assert!(matches!(
            catalog.update(99, &draft("Ghost", 1.0), f.owner),
            Err(ApiError::NotFound("Product"))
        ));
        assert!(matches!(catalog.delete(99, f.owner), Err(ApiError::NotFound("Product"))));
        assert!(matches!(catalog.image(99), Err(ApiError::NotFound("Product"))));
    }

    #[test]
    fn only_owner_deletes() {
        let f = fixture();
        let catalog = Catalog::new(&f.db);
        let product = catalog.create(&draft("Radio", 500.0), f.owner).unwrap();
        f.db.create_message(product.id, f.stranger, f.owner, "hi").unwrap();

        assert!(matches!(catalog.delete(product.id, f.stranger), Err(ApiError::Unauthorized(_))));
        assert!(catalog.find_by_id(product.id).unwrap().is_some());

        catalog.delete(product.id, f.owner).unwrap();
        assert!(catalog.find_by_id(product.id).unwrap().is_none());
        assert!(f.db.get_messages_by_user(f.stranger).unwrap().is_empty());
    }

    #[test]
    fn unbounded_search_union_over_pages_matches_unpaginated() {
        let f = fixture();
        let catalog = Catalog::new(&f.db);
        for (i, name) in ["kettle", "Anvil", "bench", "Zither", "drum", "cello", "Easel"].iter().enumerate() {
            let owner = if i % 3 == 0 { f.owner } else { f.stranger };
            catalog.create(&draft(name, i as f64 * 10.0), owner).unwrap();
        }

        for scope in [SearchScope::OwnedBy(f.owner), SearchScope::ExcludingOwner(f.owner)] {
            let all = catalog
                .search(&everything(), scope, PageRequest { page: 0, size: 100 })
                .unwrap();
            assert_eq!(all.total_pages, 1);

            for size in [1, 2, 3] {
                let first = catalog.search(&everything(), scope, PageRequest { page: 0, size }).unwrap();
                let mut ids = Vec::new();
                for page in 0..first.total_pages {
                    let chunk = catalog.search(&everything(), scope, PageRequest { page, size }).unwrap();
                    assert!(chunk.content.len() <= size as usize);
                    ids.extend(chunk.content.into_iter().map(|p| p.id));
                }
                let expected: Vec<i64> = all.content.iter().map(|p| p.id).collect();
                assert_eq!(ids, expected);
                assert_eq!(first.total_elements, all.total_elements);
            }

            let owned = |p: &Product| p.owner_id == f.owner;
            match scope {
                SearchScope::OwnedBy(_) => assert!(all.content.iter().all(owned)),
                SearchScope::ExcludingOwner(_) => assert!(!all.content.iter().any(owned)),
            }
        }
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let f = fixture();
        let result = Catalog::new(&f.db).search(
            &everything(),
            SearchScope::OwnedBy(f.owner),
            PageRequest { page: 0, size: 0 },
        );
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }
}
