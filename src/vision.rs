use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;

const CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const VISION_MODEL: &str = "gpt-4.1";

/// Exact sentinel the model is instructed to return for recipe-free pages.
pub const NO_RECIPE_SENTINEL: &str = "<no recipe>";

const SYSTEM_PROMPT: &str = r#"You are a cookbook digitization assistant for importing recipes into Mealie.
You will be sent a scanned cookbook page (a PNG). The page may contain zero
recipes (e.g. TOC, dedication, photo page), one complete recipe, or several.

For each recipe present, output one self-contained block in valid JSON-LD,
inside a <script type="application/ld+json"> ... </script> tag, following the
schema.org/Recipe specification.

Fill out these fields when possible: @context, @type, name, author,
description, datePublished, prepTime, cookTime, totalTime, recipeYield,
keywords, recipeIngredient, recipeInstructions. Use "@type": "Recipe" for each
recipe and "@type": "HowToStep" for each instruction step. For "keywords",
always include "My Sisters' Kitchen" first, then the best-fitting section
keyword from: "Appetizers", "Soups", "Salads", "Beverages", "Side Dishes",
"Entrees", "Baked Goods", "Desserts", "Other". Leave unknown values out rather
than guessing, except times and yields where a typical estimate is acceptable.

Capture every instruction as its own HowToStep and every ingredient on its own
line. If the page contains more than one recipe, output multiple blocks, one
per recipe, nothing between them.

If there is NO recipe content on the page, respond with exactly: <no recipe>
Do not use Markdown, code fences, commentary, or separators. Output only the
script blocks (or the sentinel), nothing else."#;

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

pub struct VisionClient {
    http: reqwest::Client,
    api_key: String,
}

impl VisionClient {
    pub fn new(api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, api_key })
    }

    /// Send one scanned page to the vision model and return its raw text
    /// reply: either the no-recipe sentinel or concatenated JSON-LD blocks.
    pub async fn extract_page(&self, png_bytes: &[u8]) -> Result<String> {
        let data_url = format!("data:image/png;base64,{}", BASE64.encode(png_bytes));

        let body = json!({
            "model": VISION_MODEL,
            "max_tokens": 2048,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "image_url",
                            "image_url": { "url": data_url, "detail": "high" }
                        }
                    ]
                }
            ]
        });

        let response = self
            .http
            .post(CHAT_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Vision model request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            bail!("Vision model returned HTTP {}: {}", status, detail);
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("Vision model response was not valid JSON")?;

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .context("Vision model response had no choices")?;

        Ok(content)
    }
}

/// The sentinel comparison is tolerant of case and surrounding whitespace.
pub fn is_no_recipe(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(NO_RECIPE_SENTINEL)
}
