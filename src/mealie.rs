use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

/// Connection settings for one Mealie server.
#[derive(Debug, Clone)]
pub struct MealieConfig {
    pub base_url: String,
    pub token: String,
}

/// One stored recipe as the catalog reports it. Only the fields this tool
/// reads; everything else in the payload is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<TagRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

#[derive(Debug, Deserialize)]
struct RecipePage {
    #[serde(default)]
    items: Vec<CatalogEntry>,
}

/// The four catalog operations the pipelines need. `MealieClient` is the real
/// implementation; tests substitute a recording fake.
#[allow(async_fn_in_trait)]
pub trait Catalog {
    async fn search(&self, name: &str) -> Result<Vec<CatalogEntry>>;
    async fn list_page(&self, page: usize, per_page: usize) -> Result<Vec<CatalogEntry>>;
    async fn delete(&self, id: &str) -> Result<StatusCode>;
    async fn create_from_url(&self, url: &str) -> Result<StatusCode>;
}

pub struct MealieClient {
    http: reqwest::Client,
    config: MealieConfig,
}

impl MealieClient {
    pub fn new(config: MealieConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, config })
    }

    fn recipes_endpoint(&self) -> String {
        format!("{}/api/recipes", self.config.base_url.trim_end_matches('/'))
    }

    async fn get_items(&self, url: reqwest::Url) -> Result<Vec<CatalogEntry>> {
        let page: RecipePage = self
            .http
            .get(url)
            .bearer_auth(&self.config.token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("Catalog request failed")?
            .json()
            .await
            .context("Catalog response was not valid JSON")?;
        Ok(page.items)
    }
}

impl Catalog for MealieClient {
    async fn search(&self, name: &str) -> Result<Vec<CatalogEntry>> {
        let url = reqwest::Url::parse_with_params(&self.recipes_endpoint(), [("search", name)])
            .context("Invalid server URL")?;
        self.get_items(url).await
    }

    async fn list_page(&self, page: usize, per_page: usize) -> Result<Vec<CatalogEntry>> {
        let url = reqwest::Url::parse_with_params(
            &self.recipes_endpoint(),
            [("page", page.to_string()), ("perPage", per_page.to_string())],
        )
        .context("Invalid server URL")?;
        self.get_items(url).await
    }

    async fn delete(&self, id: &str) -> Result<StatusCode> {
        let response = self
            .http
            .delete(format!("{}/{}", self.recipes_endpoint(), id))
            .bearer_auth(&self.config.token)
            .send()
            .await
            .context("Catalog delete failed")?;
        Ok(response.status())
    }

    async fn create_from_url(&self, url: &str) -> Result<StatusCode> {
        let response = self
            .http
            .post(format!("{}/create/url", self.recipes_endpoint()))
            .bearer_auth(&self.config.token)
            .json(&json!({ "url": url, "includeTags": true }))
            .send()
            .await
            .context("Catalog import failed")?;
        Ok(response.status())
    }
}
