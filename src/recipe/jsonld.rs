use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{normalize_steps, Instruction, Keywords, RecipeRecord};

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]*application/ld\+json[^>]*>(.*?)</script>"#).unwrap()
});

/// A JSON-LD script block: the full `<script>...</script>` text plus its
/// inner JSON content.
#[derive(Debug, Clone)]
pub struct Block<'a> {
    pub full: &'a str,
    pub inner: &'a str,
}

/// Locate the first embedded JSON-LD block in a page, if any.
pub fn first_block(html: &str) -> Option<Block<'_>> {
    let caps = BLOCK_RE.captures(html)?;
    Some(Block {
        full: caps.get(0)?.as_str(),
        inner: caps.get(1)?.as_str(),
    })
}

/// Every JSON-LD block in a text, in order. Used to split vision-model output
/// carrying one block per detected recipe.
pub fn all_blocks(text: &str) -> Vec<Block<'_>> {
    BLOCK_RE
        .captures_iter(text)
        .filter_map(|caps| {
            Some(Block {
                full: caps.get(0)?.as_str(),
                inner: caps.get(1)?.as_str(),
            })
        })
        .collect()
}

/// Best-effort parse of a JSON-LD document into a RecipeRecord.
/// Malformed JSON or a non-object document yields None, same as "no data".
pub fn parse_record(json: &str) -> Option<RecipeRecord> {
    let value: Value = serde_json::from_str(json.trim()).ok()?;
    let obj = value.as_object()?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let tags = obj
        .get("keywords")
        .cloned()
        .and_then(|v| serde_json::from_value::<Keywords>(v).ok())
        .map(Keywords::into_tags)
        .unwrap_or_default();

    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let ingredients = obj
        .get("recipeIngredient")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let steps = obj
        .get("recipeInstructions")
        .cloned()
        .and_then(|v| serde_json::from_value::<Vec<Instruction>>(v).ok())
        .map(normalize_steps)
        .unwrap_or_default();

    Some(RecipeRecord {
        name,
        tags,
        description,
        ingredients,
        steps,
    })
}

/// Two-stage extraction from page HTML: locate the block, then parse it.
/// Returns None uniformly for "no block" and "malformed block".
pub fn extract(html: &str) -> Option<RecipeRecord> {
    parse_record(first_block(html)?.inner)
}
