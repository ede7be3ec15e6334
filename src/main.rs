mod digitize;
mod imagegen;
mod listing;
mod mealie;
mod recipe;
mod reconcile;
mod vision;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use crate::mealie::{MealieClient, MealieConfig};
use crate::reconcile::ReconcileOutcome;

#[derive(Parser)]
#[command(name = "mealie_sync", about = "Recipe catalog sync and cookbook digitization")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape an HTML directory index of recipe pages and delete+reimport each into Mealie
    Import {
        /// Directory listing URL with *.html recipe pages
        #[arg(long)]
        index_url: String,
        /// Mealie base URL, e.g. http://host:9925
        #[arg(long)]
        server: String,
        /// API token (falls back to the --token-env variable)
        #[arg(long)]
        token: Option<String>,
        /// Env var consulted when --token is not given
        #[arg(long, default_value = "MEALIE_TOKEN")]
        token_env: String,
        /// Only import recipes carrying this tag
        #[arg(long)]
        tag: Option<String>,
        /// Max pages to import (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Delete every catalog entry carrying a tag, then exit
    Purge {
        /// Mealie base URL
        #[arg(long)]
        server: String,
        /// API token (falls back to the --token-env variable)
        #[arg(long)]
        token: Option<String>,
        /// Env var consulted when --token is not given
        #[arg(long, default_value = "MEALIE_TOKEN")]
        token_env: String,
        /// Tag to purge (matched case- and punctuation-insensitively)
        #[arg(long)]
        tag: String,
    },
    /// Extract recipes from scanned cookbook PNG pages via a vision model
    Digitize {
        /// Folder containing PNG pages
        input_dir: PathBuf,
        /// Where to write *.html, *.png and *.prompt.txt files
        #[arg(long, default_value = "recipes_parsed")]
        out_dir: PathBuf,
        /// Model API key (or set OPENAI_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
        /// Rewrite each block's image field to {base}/{slug}.png
        #[arg(long)]
        image_base_url: Option<String>,
        /// Skip hero-image generation
        #[arg(long)]
        no_images: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Import {
            index_url,
            server,
            token,
            token_env,
            tag,
            limit,
        } => {
            let token = resolve_credential(token, &token_env, "--token")?;
            run_import(&index_url, server, token, tag.as_deref(), limit).await
        }
        Commands::Purge {
            server,
            token,
            token_env,
            tag,
        } => {
            let token = resolve_credential(token, &token_env, "--token")?;
            let catalog = MealieClient::new(MealieConfig {
                base_url: server,
                token,
            })?;
            let deleted = reconcile::purge_by_tag(&catalog, &tag).await?;
            println!("Purged {} entries tagged '{}'.", deleted, tag);
            Ok(())
        }
        Commands::Digitize {
            input_dir,
            out_dir,
            api_key,
            image_base_url,
            no_images,
        } => {
            let api_key = resolve_credential(api_key, "OPENAI_API_KEY", "--api-key")?;
            run_digitize(&input_dir, out_dir, api_key, image_base_url, no_images).await
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Flag value wins; otherwise the named env var. Missing both is fatal.
fn resolve_credential(flag: Option<String>, env_name: &str, flag_name: &str) -> Result<String> {
    if let Some(value) = flag {
        return Ok(value);
    }
    std::env::var(env_name)
        .map_err(|_| anyhow!("Provide {} or set the {} environment variable.", flag_name, env_name))
}

async fn run_import(
    index_url: &str,
    server: String,
    token: String,
    required_tag: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let mut links = listing::fetch_recipe_links(&http, index_url).await?;
    if links.is_empty() {
        bail!("No .html files found at {}", index_url);
    }
    if let Some(n) = limit {
        links.truncate(n);
    }
    println!("Importing {} recipe pages...", links.len());

    let catalog = MealieClient::new(MealieConfig {
        base_url: server,
        token,
    })?;

    let mut imported = 0usize;
    let mut deleted = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    for url in &links {
        let html = match http.get(url).send().await.and_then(|r| r.error_for_status()) {
            Ok(resp) => match resp.text().await {
                Ok(text) => text,
                Err(e) => {
                    warn!("{}: cannot read page ({})", url, e);
                    failed += 1;
                    continue;
                }
            },
            Err(e) => {
                warn!("{}: cannot fetch page ({})", url, e);
                failed += 1;
                continue;
            }
        };

        let record = match recipe::jsonld::extract(&html) {
            Some(r) if !r.name.is_empty() => r,
            _ => {
                warn!("{}: no recipe name found", url);
                skipped += 1;
                continue;
            }
        };

        match reconcile::reconcile(&catalog, &record, url, required_tag).await {
            Ok(ReconcileOutcome::SkippedTag) => skipped += 1,
            Ok(ReconcileOutcome::Imported {
                deleted: d,
                import_status,
            }) => {
                deleted += d;
                if import_status.is_success() {
                    imported += 1;
                } else {
                    warn!("{}: import returned HTTP {}", url, import_status);
                    failed += 1;
                }
            }
            Err(e) => {
                warn!("{}: import failed ({})", url, e);
                failed += 1;
            }
        }
    }

    println!(
        "Done: {} imported, {} duplicates deleted, {} skipped, {} failed.",
        imported, deleted, skipped, failed
    );
    Ok(())
}

async fn run_digitize(
    input_dir: &Path,
    out_dir: PathBuf,
    api_key: String,
    image_base_url: Option<String>,
    no_images: bool,
) -> Result<()> {
    let vision = vision::VisionClient::new(api_key.clone())?;
    let imagegen = if no_images {
        None
    } else {
        Some(imagegen::ImageGenClient::new(api_key)?)
    };

    let opts = digitize::DigitizeOptions {
        out_dir,
        image_base_url,
    };

    let counts =
        digitize::process_folder(&vision, imagegen.as_ref(), input_dir, &opts).await?;
    if counts.pages == 0 {
        println!("No PNG files found in {}.", input_dir.display());
        return Ok(());
    }
    counts.print();
    Ok(())
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
