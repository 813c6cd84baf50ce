//! Seam for the external product catalog used to attach brands to product codes.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// A brand as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandRecord {
    pub external_id: i64,
    pub name: String,
}

#[derive(Debug, Error)]
#[error("catalog lookup failed: {0}")]
pub struct CatalogError(pub String);

#[async_trait]
pub trait BrandCatalog: Send + Sync {
    /// Look up the brand of every code in `sku_codes`.
    ///
    /// Codes the catalog does not know, or knows without a usable brand id,
    /// are absent from the returned map.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the catalog cannot be reached or answers
    /// with something unreadable.
    async fn lookup_brands(
        &self,
        sku_codes: &[i64],
    ) -> Result<HashMap<i64, BrandRecord>, CatalogError>;
}
