//! HTTP client for the marketplace product-card endpoint, used to find the
//! brand behind each product code.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use mentions_core::{BrandCatalog, BrandRecord, CatalogError};
use reqwest::Client;
use serde::Deserialize;

use crate::error::ScraperError;
use crate::retry::retry_fixed;

/// Most codes the catalog accepts in one request.
pub const CATALOG_BATCH_SIZE: usize = 50;

const CATALOG_QUERY: &str = "appType=1&curr=rub&dest=-1257786\
    &regions=68,64,83,4,38,80,33,70,82,86,75,30,69,1,48,22,66,31,40,71&spp=33";

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    data: Option<CatalogData>,
}

#[derive(Debug, Deserialize)]
struct CatalogData {
    #[serde(default)]
    products: Vec<CatalogProduct>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogProduct {
    pub id: i64,
    pub brand: Option<String>,
    #[serde(rename = "brandId")]
    pub brand_id: Option<i64>,
}

pub struct CatalogClient {
    client: Client,
    url: String,
    max_retries: u32,
    retry_delay_secs: u64,
}

impl CatalogClient {
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn new(
        url: &str,
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        retry_delay_secs: u64,
    ) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_owned(),
            max_retries,
            retry_delay_secs,
        })
    }

    fn batch_url(&self, codes: &[i64]) -> String {
        let nm = codes
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(";");
        format!("{}?{CATALOG_QUERY}&nm={nm}", self.url)
    }

    /// Fetches the product cards for at most [`CATALOG_BATCH_SIZE`] codes.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::UnexpectedStatus`] for a non-2xx answer,
    /// [`ScraperError::Deserialize`] for an unreadable body, or
    /// [`ScraperError::Http`] once retries are exhausted.
    pub async fn fetch_batch(&self, codes: &[i64]) -> Result<Vec<CatalogProduct>, ScraperError> {
        let url = self.batch_url(codes);

        let body = retry_fixed(self.max_retries, self.retry_delay_secs, || {
            let url = url.clone();
            async move {
                let response = self.client.get(&url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(ScraperError::UnexpectedStatus {
                        status: status.as_u16(),
                        url,
                    });
                }
                Ok::<_, ScraperError>(response.text().await?)
            }
        })
        .await?;

        let parsed: CatalogResponse =
            serde_json::from_str(&body).map_err(|source| ScraperError::Deserialize {
                context: "catalog product cards".to_owned(),
                source,
            })?;
        Ok(parsed.data.map(|d| d.products).unwrap_or_default())
    }
}

#[async_trait]
impl BrandCatalog for CatalogClient {
    async fn lookup_brands(
        &self,
        sku_codes: &[i64],
    ) -> Result<HashMap<i64, BrandRecord>, CatalogError> {
        let mut brands = HashMap::new();
        for chunk in sku_codes.chunks(CATALOG_BATCH_SIZE) {
            let products = self
                .fetch_batch(chunk)
                .await
                .map_err(|e| CatalogError(e.to_string()))?;
            for product in products {
                match product.brand_id {
                    Some(external_id) if external_id != 0 => {
                        brands.insert(
                            product.id,
                            BrandRecord {
                                external_id,
                                name: product.brand.unwrap_or_default(),
                            },
                        );
                    }
                    _ => tracing::debug!(sku = product.id, "catalog card has no brand"),
                }
            }
        }
        tracing::debug!(
            requested = sku_codes.len(),
            branded = brands.len(),
            "catalog lookup finished"
        );
        Ok(brands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_url_joins_codes_with_semicolons() {
        let client = CatalogClient::new("https://catalog.example/cards/detail/", 5, "ua", 0, 0)
            .unwrap();
        let url = client.batch_url(&[11_111, 22_222]);
        assert!(url.starts_with("https://catalog.example/cards/detail?appType=1&curr=rub"));
        assert!(url.ends_with("&spp=33&nm=11111;22222"));
    }

    #[test]
    fn product_without_brand_id_deserializes() {
        let product: CatalogProduct =
            serde_json::from_str(r#"{"id": 5, "brand": ""}"#).unwrap();
        assert_eq!(product.brand_id, None);
    }
}
