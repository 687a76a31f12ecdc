use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

use bazaar_types::api::{ProductRequest, SearchQuery};
use bazaar_types::models::{Page, PageRequest, Product, ProductFilter, SearchScope};

use crate::auth::AppState;
use crate::blocking;
use crate::catalog::{Catalog, ProductDraft};
use crate::error::{ApiError, ApiResult};
use crate::middleware::CurrentUser;

/// GET /products — everyone else's listings.
pub async fn browse(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Page<Product>>> {
    search(state, SearchScope::ExcludingOwner(user.id), query).await
}

/// GET /products/mine — the caller's own listings, filtered.
pub async fn mine(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Page<Product>>> {
    search(state, SearchScope::OwnedBy(user.id), query).await
}

async fn search(state: AppState, scope: SearchScope, query: SearchQuery) -> ApiResult<Json<Page<Product>>> {
    let filter = ProductFilter {
        category: query.category,
        query: query.query,
        min_price: query.min_price,
        max_price: Some(query.max_price),
    };
    let page = PageRequest {
        page: query.page,
        size: query.size,
    };

    let page = blocking(move || Catalog::new(&state.db).search(&filter, scope, page)).await?;
    Ok(Json(page))
}

/// GET /me/products
pub async fn list_owned(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Product>>> {
    let products = blocking(move || Catalog::new(&state.db).list_for_owner(user.id)).await?;
    Ok(Json(products))
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<ProductRequest>,
) -> ApiResult<impl IntoResponse> {
    let draft = draft_from_request(req)?;
    let product = blocking(move || Catalog::new(&state.db).create(&draft, user.id)).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> ApiResult<Json<Product>> {
    let product = blocking(move || Catalog::new(&state.db).find_by_id(product_id))
        .await?
        .ok_or(ApiError::NotFound("Product"))?;
    Ok(Json(product))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<ProductRequest>,
) -> ApiResult<Json<Product>> {
    let draft = draft_from_request(req)?;
    let product =
        blocking(move || Catalog::new(&state.db).update(product_id, &draft, user.id)).await?;
    Ok(Json(product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<StatusCode> {
    blocking(move || Catalog::new(&state.db).delete(product_id, user.id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /products/{id}/image — the raw image blob.
pub async fn product_image(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let bytes = blocking(move || Catalog::new(&state.db).image(product_id))
        .await?
        .ok_or(ApiError::NotFound("Image"))?;

    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}

fn draft_from_request(req: ProductRequest) -> ApiResult<ProductDraft> {
    let image = req
        .image
        .map(|encoded| B64.decode(encoded))
        .transpose()
        .map_err(|_| ApiError::Validation("Image must be base64".into()))?;

    Ok(ProductDraft {
        name: req.name,
        brand: req.brand,
        category: req.category,
        price: req.price,
        description: req.description,
        contact: req.contact,
        address: req.address,
        image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(image: Option<&str>) -> ProductRequest {
        ProductRequest {
            name: "Camera".into(),
            brand: String::new(),
            category: String::new(),
            price: 10.0,
            description: String::new(),
            contact: String::new(),
            address: String::new(),
            image: image.map(str::to_string),
        }
    }

    #[test]
    fn image_is_decoded_from_base64() {
        let draft = draft_from_request(request(Some("AQID"))).unwrap();
        assert_eq!(draft.image, Some(vec![1, 2, 3]));

        assert_eq!(draft_from_request(request(None)).unwrap().image, None);
    }

    #[test]
    fn malformed_image_is_a_validation_error() {
        assert!(matches!(
            draft_from_request(request(Some("not base64!"))),
            Err(ApiError::Validation(_))
        ));
    }
}
