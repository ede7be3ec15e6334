use std::collections::BTreeSet;

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use tracing::info;
use url::Url;

const PAGE_SUFFIX: &str = ".html";

/// Fetch a directory index page and return the recipe page URLs it links to.
pub async fn fetch_recipe_links(client: &reqwest::Client, index_url: &str) -> Result<Vec<String>> {
    info!("Fetching recipe index: {}", index_url);
    let html = client
        .get(index_url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .context("Unable to fetch index")?
        .text()
        .await
        .context("Unable to read index body")?;

    let links = extract_links(&html, index_url)?;
    info!("Recipe pages in index: {}", links.len());
    Ok(links)
}

/// Parse anchor elements out of an index page and resolve every href ending in
/// the page suffix (case-insensitive) to an absolute URL. Sorted, deduplicated.
pub fn extract_links(html: &str, index_url: &str) -> Result<Vec<String>> {
    // Directory indexes link relative to the directory itself.
    let base = if index_url.ends_with('/') {
        index_url.to_string()
    } else {
        format!("{}/", index_url)
    };
    let base = Url::parse(&base).with_context(|| format!("Invalid index URL: {}", index_url))?;

    let document = Html::parse_document(html);
    let anchor = Selector::parse("a[href]").expect("static selector");

    let mut resolved: BTreeSet<String> = BTreeSet::new();
    for element in document.select(&anchor) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if !href.to_lowercase().ends_with(PAGE_SUFFIX) {
            continue;
        }
        if let Ok(url) = base.join(href) {
            resolved.insert(url.to_string());
        }
    }

    Ok(resolved.into_iter().collect())
}
