use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::imagegen::ImageGenClient;
use crate::recipe::{self, jsonld, RecipeRecord};
use crate::vision::{self, VisionClient};

#[derive(Debug, Clone)]
pub struct DigitizeOptions {
    pub out_dir: PathBuf,
    /// When set, the persisted block's `image` field is rewritten to
    /// `{base}/{slug}.png` instead of whatever the model produced.
    pub image_base_url: Option<String>,
}

pub struct SavedRecipe {
    pub record: RecipeRecord,
    pub slug: String,
    pub png_path: PathBuf,
}

/// Totals across one digitize run.
pub struct DigitizeCounts {
    pub pages: usize,
    pub recipes: usize,
    pub skipped_pages: usize,
}

impl DigitizeCounts {
    pub fn print(&self) {
        println!(
            "Processed {} pages: {} recipes saved, {} pages without recipes.",
            self.pages, self.recipes, self.skipped_pages
        );
    }
}

/// Split a vision-model reply into blocks and persist one `<slug>.html` per
/// parseable recipe. A malformed block is skipped, the rest still land.
pub fn write_blocks(
    raw_text: &str,
    fallback_stem: &str,
    opts: &DigitizeOptions,
) -> Result<Vec<SavedRecipe>> {
    if vision::is_no_recipe(raw_text) {
        info!("[{}] no recipe detected", fallback_stem);
        return Ok(Vec::new());
    }

    let blocks = jsonld::all_blocks(raw_text);
    if blocks.is_empty() {
        warn!("[{}] no recipe blocks found in model reply", fallback_stem);
        return Ok(Vec::new());
    }

    let mut saved = Vec::new();
    for block in blocks {
        let Some(record) = jsonld::parse_record(block.inner) else {
            warn!("[{}] skipping malformed recipe block", fallback_stem);
            continue;
        };

        let slug = match recipe::slug(&record.name) {
            s if s.is_empty() => recipe::slug(fallback_stem),
            s => s,
        };

        let html = render_block(&block, &slug, opts.image_base_url.as_deref());
        let html_path = opts.out_dir.join(format!("{}.html", slug));
        std::fs::write(&html_path, html)
            .with_context(|| format!("Failed to write {}", html_path.display()))?;
        info!("Saved {}", html_path.display());

        let png_path = opts.out_dir.join(format!("{}.png", slug));
        saved.push(SavedRecipe {
            record,
            slug,
            png_path,
        });
    }

    Ok(saved)
}

/// The block is persisted verbatim unless an image base URL is configured,
/// in which case the JSON is rewritten with the canonical `image` field.
fn render_block(block: &jsonld::Block<'_>, slug: &str, image_base: Option<&str>) -> String {
    let Some(base) = image_base else {
        return format!("{}\n", block.full.trim());
    };

    let Ok(mut value) = serde_json::from_str::<serde_json::Value>(block.inner.trim()) else {
        return format!("{}\n", block.full.trim());
    };
    if let Some(obj) = value.as_object_mut() {
        let url = format!("{}/{}.png", base.trim_end_matches('/'), slug);
        obj.insert("image".to_string(), serde_json::Value::String(url));
    }
    let json = serde_json::to_string_pretty(&value).unwrap_or_else(|_| block.inner.to_string());
    format!("<script type=\"application/ld+json\">\n{}\n</script>\n", json)
}

/// Digitize one scanned page: vision call, block persistence, hero images.
pub async fn process_image(
    vision: &VisionClient,
    imagegen: Option<&ImageGenClient>,
    png_path: &Path,
    opts: &DigitizeOptions,
) -> Result<Vec<SavedRecipe>> {
    let stem = png_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("page")
        .to_string();

    let bytes = std::fs::read(png_path)
        .with_context(|| format!("Failed to read {}", png_path.display()))?;
    let raw_text = vision.extract_page(&bytes).await?;

    let saved = write_blocks(&raw_text, &stem, opts)?;

    if let Some(gen) = imagegen {
        for recipe in &saved {
            // Failures inside are logged; a broken image never blocks the
            // remaining recipes on the page.
            if let Err(e) = gen.save_hero_image(&recipe.record, &recipe.png_path).await {
                warn!("Hero image step failed for '{}': {}", recipe.slug, e);
            }
        }
    }

    Ok(saved)
}

/// Walk every PNG directly in `input_dir` (sorted, non-recursive) and
/// digitize each page. Per-page failures are logged and contained.
pub async fn process_folder(
    vision: &VisionClient,
    imagegen: Option<&ImageGenClient>,
    input_dir: &Path,
    opts: &DigitizeOptions,
) -> Result<DigitizeCounts> {
    let mut pages: Vec<PathBuf> = std::fs::read_dir(input_dir)
        .with_context(|| format!("Input directory not found: {}", input_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("png"))
        })
        .collect();
    pages.sort();

    if pages.is_empty() {
        return Ok(DigitizeCounts {
            pages: 0,
            recipes: 0,
            skipped_pages: 0,
        });
    }

    std::fs::create_dir_all(&opts.out_dir)
        .with_context(|| format!("Cannot create output directory {}", opts.out_dir.display()))?;

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut counts = DigitizeCounts {
        pages: pages.len(),
        recipes: 0,
        skipped_pages: 0,
    };

    for page in &pages {
        pb.set_message(
            page.file_name()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string(),
        );
        match process_image(vision, imagegen, page, opts).await {
            Ok(saved) if saved.is_empty() => counts.skipped_pages += 1,
            Ok(saved) => counts.recipes += saved.len(),
            Err(e) => {
                warn!("{}: {}", page.display(), e);
                counts.skipped_pages += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(dir: &Path) -> DigitizeOptions {
        DigitizeOptions {
            out_dir: dir.to_path_buf(),
            image_base_url: None,
        }
    }

    #[test]
    fn sentinel_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let saved = write_blocks("<no recipe>", "page_012", &opts(dir.path())).unwrap();
        assert!(saved.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn writes_one_file_per_block() {
        let dir = tempfile::tempdir().unwrap();
        let raw = concat!(
            r#"<script type="application/ld+json">{"name": "White Chili"}</script>"#,
            "\n",
            r#"<script type="application/ld+json">{"name": "Apple & Walnut, Cranberry Salad!"}</script>"#,
        );
        let saved = write_blocks(raw, "page_012", &opts(dir.path())).unwrap();
        assert_eq!(saved.len(), 2);
        assert!(dir.path().join("white_chili.html").exists());
        assert!(dir.path().join("apple_walnut_cranberry_salad.html").exists());
    }

    #[test]
    fn malformed_block_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let raw = concat!(
            r#"<script type="application/ld+json">{broken</script>"#,
            "\n",
            r#"<script type="application/ld+json">{"name": "Fudge"}</script>"#,
        );
        let saved = write_blocks(raw, "page_012", &opts(dir.path())).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].slug, "fudge");
    }

    #[test]
    fn nameless_recipe_falls_back_to_page_stem() {
        let dir = tempfile::tempdir().unwrap();
        let raw = r#"<script type="application/ld+json">{"keywords": "Soups"}</script>"#;
        let saved = write_blocks(raw, "page_012", &opts(dir.path())).unwrap();
        assert_eq!(saved[0].slug, "page_012");
        assert!(dir.path().join("page_012.html").exists());
    }

    #[test]
    fn block_persisted_verbatim_without_image_base() {
        let dir = tempfile::tempdir().unwrap();
        let raw = r#"<script type="application/ld+json">{"name": "Fudge"}</script>"#;
        write_blocks(raw, "p", &opts(dir.path())).unwrap();
        let written = std::fs::read_to_string(dir.path().join("fudge.html")).unwrap();
        assert_eq!(written, format!("{}\n", raw));
    }

    #[test]
    fn image_base_injects_canonical_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut o = opts(dir.path());
        o.image_base_url = Some("https://files.example.com/recipes/".into());
        let raw = r#"<script type="application/ld+json">{"name": "Fudge", "image": "old.png"}</script>"#;
        write_blocks(raw, "p", &o).unwrap();
        let written = std::fs::read_to_string(dir.path().join("fudge.html")).unwrap();
        assert!(written.contains("https://files.example.com/recipes/fudge.png"));
        assert!(!written.contains("old.png"));
    }
}
