use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::recipe::RecipeRecord;

const IMAGES_ENDPOINT: &str = "https://api.openai.com/v1/images/generations";
const IMAGE_MODEL: &str = "gpt-image-1";

/// A generated image arrives either as a fetchable URL or inline base64.
pub enum ImagePayload {
    Url(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

/// Build the photographic prompt for one recipe: the finished dish only,
/// plated, nothing inedible, no text or packaging in frame.
pub fn build_prompt(record: &RecipeRecord) -> String {
    let ingredients = record.ingredients.join(", ");
    let steps = record.steps.join(" ");
    let description = record
        .description
        .as_deref()
        .map(|d| format!("{} ", d.trim()))
        .unwrap_or_default();

    format!(
        "High-quality, realistic photograph of the completed dish '{}', \
         as it would appear freshly prepared and ready to serve in a professional \
         recipe website photo. {}\
         Show only the finished dish, attractively plated, isolated on a neutral \
         background. All visible food should be fully prepared, cooked, and \
         presented exactly as described in the recipe, with edible garnishes \
         only. No text, no labels, no packaging, no kitchen tools, no hands, no \
         inedible parts. Fruit should be sliced and hulled as needed, meat \
         cooked, no raw leaves or stems. \
         Include only items from these ingredients: {}. \
         Present the food in a way that matches the steps: {} \
         Do not include any unrelated objects, backgrounds, or people. The focus \
         should be entirely on the finished, edible dish, as it would be served.",
        record.name, description, ingredients, steps
    )
}

pub struct ImageGenClient {
    http: reqwest::Client,
    api_key: String,
}

impl ImageGenClient {
    pub fn new(api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, api_key })
    }

    pub async fn generate(&self, prompt: &str) -> Result<ImagePayload> {
        let body = json!({
            "model": IMAGE_MODEL,
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024",
            "quality": "high"
        });

        let response = self
            .http
            .post(IMAGES_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Image model request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            bail!("Image model returned HTTP {}: {}", status, detail);
        }

        let parsed: ImageResponse = response
            .json()
            .await
            .context("Image model response was not valid JSON")?;
        let data = parsed
            .data
            .into_iter()
            .next()
            .context("Image model returned no data")?;

        if let Some(url) = data.url {
            Ok(ImagePayload::Url(url))
        } else if let Some(b64) = data.b64_json {
            let bytes = BASE64
                .decode(b64.as_bytes())
                .context("Image payload was not valid base64")?;
            Ok(ImagePayload::Bytes(bytes))
        } else {
            bail!("Image model returned neither URL nor inline data")
        }
    }

    /// Write `<base>.prompt.txt`, then generate and write `<base>.png`.
    /// The prompt file is written before the model call so a failed or
    /// interrupted generation still leaves a record of what was attempted.
    /// Generation failures are logged, never propagated.
    pub async fn save_hero_image(&self, record: &RecipeRecord, png_path: &Path) -> Result<()> {
        let prompt = build_prompt(record);
        let prompt_path = png_path.with_extension("prompt.txt");
        std::fs::write(&prompt_path, &prompt)
            .with_context(|| format!("Failed to write {}", prompt_path.display()))?;
        info!("Prompt saved to {}", prompt_path.display());

        let bytes = match self.generate(&prompt).await {
            Ok(ImagePayload::Bytes(bytes)) => bytes,
            Ok(ImagePayload::Url(url)) => {
                match self.http.get(&url).send().await.and_then(|r| r.error_for_status()) {
                    Ok(resp) => match resp.bytes().await {
                        Ok(b) => b.to_vec(),
                        Err(e) => {
                            warn!("Image download failed for '{}': {}", record.name, e);
                            return Ok(());
                        }
                    },
                    Err(e) => {
                        warn!("Image download failed for '{}': {}", record.name, e);
                        return Ok(());
                    }
                }
            }
            Err(e) => {
                warn!("Image generation failed for '{}': {}", record.name, e);
                return Ok(());
            }
        };

        std::fs::write(png_path, bytes)
            .with_context(|| format!("Failed to write {}", png_path.display()))?;
        info!("Image saved to {}", png_path.display());
        Ok(())
    }
}
