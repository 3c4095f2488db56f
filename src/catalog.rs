//! Catalog loading and in-memory filtering for the product grid.

use std::collections::HashSet;
use tracing::{info, warn};

use crate::db::OfflineStore;
use crate::error::PosResult;
use crate::models::{Category, Product};
use crate::remote::RemoteStore;

/// Category filter value that matches every product.
pub const ALL_CATEGORIES: &str = "all";

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSnapshot {
    pub products: Vec<Product>,
    pub categories: Vec<Category>,
    /// `true` when served from the offline cache.
    pub from_cache: bool,
}

/// Unique, non-empty category names in first-seen order.
pub fn derive_categories(products: &[Product]) -> Vec<Category> {
    let mut seen = HashSet::new();
    products
        .iter()
        .map(|p| p.category.trim())
        .filter(|c| !c.is_empty() && seen.insert(c.to_string()))
        .map(|c| Category {
            id: c.to_string(),
            name: c.to_string(),
        })
        .collect()
}

/// Products in `category` (or all) whose name or SKU contains `query`
/// case-insensitively, or whose barcode contains it.
pub fn filter_products<'a>(products: &'a [Product], category: &str, query: &str) -> Vec<&'a Product> {
    let query = query.trim();
    let needle = query.to_lowercase();
    products
        .iter()
        .filter(|p| category == ALL_CATEGORIES || p.category == category)
        .filter(|p| {
            if needle.is_empty() {
                return true;
            }
            p.name.to_lowercase().contains(&needle)
                || p.sku
                    .as_deref()
                    .is_some_and(|sku| sku.to_lowercase().contains(&needle))
                || p.barcode.as_deref().is_some_and(|b| b.contains(query))
        })
        .collect()
}

/// Fetch the seller's active products when online and refresh the cache;
/// otherwise, or if the fetch fails, serve the cache.
pub async fn load_catalog(
    remote: &dyn RemoteStore,
    store: &OfflineStore,
    seller_id: &str,
    online: bool,
) -> PosResult<CatalogSnapshot> {
    if online {
        match remote.list_active_products_for_seller(seller_id).await {
            Ok(products) => {
                let categories = derive_categories(&products);
                if let Err(e) = store
                    .cache_products(&products)
                    .and_then(|_| store.cache_categories(&categories))
                {
                    warn!(error = %e, "Failed to refresh catalog cache");
                }
                info!(
                    seller_id,
                    products = products.len(),
                    categories = categories.len(),
                    "Catalog loaded"
                );
                return Ok(CatalogSnapshot {
                    products,
                    categories,
                    from_cache: false,
                });
            }
            Err(e) => warn!(seller_id, error = %e, "Catalog fetch failed; using cached catalog"),
        }
    }

    let products = store.cached_products()?;
    let mut categories = store.cached_categories()?;
    if categories.is_empty() {
        categories = derive_categories(&products);
    }
    info!(products = products.len(), "Catalog served from offline cache");
    Ok(CatalogSnapshot {
        products,
        categories,
        from_cache: true,
    })
}
