use anyhow::Result;
use reqwest::StatusCode;
use tracing::{info, warn};

use crate::mealie::{Catalog, CatalogEntry};
use crate::recipe::RecipeRecord;

const PURGE_PAGE_SIZE: usize = 100;

/// What happened to one source page during import.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Required tag was absent from the extracted record.
    SkippedTag,
    Imported {
        deleted: usize,
        import_status: StatusCode,
    },
}

/// Delete-then-import for one recipe. Every catalog entry whose name matches
/// the record's name case-insensitively is deleted before the fresh import is
/// triggered; a failed delete is logged and does not block the rest.
pub async fn reconcile<C: Catalog>(
    catalog: &C,
    record: &RecipeRecord,
    source_url: &str,
    required_tag: Option<&str>,
) -> Result<ReconcileOutcome> {
    if let Some(tag) = required_tag {
        if !record.has_tag(tag) {
            info!("'{}': tag '{}' not present, skipping", record.name, tag);
            return Ok(ReconcileOutcome::SkippedTag);
        }
    }

    let wanted = record.name.to_lowercase();
    let mut deleted = 0usize;
    match catalog.search(&record.name).await {
        Ok(entries) => {
            for entry in entries {
                if entry.name.to_lowercase() != wanted {
                    continue;
                }
                match catalog.delete(&entry.id).await {
                    Ok(status) => {
                        info!("Deleted '{}' (id {}) -> {}", entry.name, entry.id, status);
                        deleted += 1;
                    }
                    Err(e) => warn!("Delete failed for '{}' (id {}): {}", entry.name, entry.id, e),
                }
            }
        }
        Err(e) => warn!("Search failed for '{}': {}", record.name, e),
    }

    // Import only after all matching deletions have been issued, otherwise the
    // fresh copy would match its own name and be deleted next run.
    let import_status = catalog.create_from_url(source_url).await?;
    info!("Imported '{}' -> HTTP {}", record.name, import_status);

    Ok(ReconcileOutcome::Imported {
        deleted,
        import_status,
    })
}

/// Lowercase and strip everything non-alphanumeric, so "Side Dishes",
/// "side-dishes" and "sidedishes" all compare equal.
pub fn canonicalize_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn matched_tag(entry: &CatalogEntry, target: &str) -> Option<String> {
    entry.tags.iter().find_map(|t| {
        if canonicalize_tag(&t.name) == target {
            Some(t.name.clone())
        } else if canonicalize_tag(&t.slug) == target {
            Some(t.slug.clone())
        } else {
            None
        }
    })
}

/// Delete every catalog entry carrying the given tag. Two phases: paginate
/// the whole catalog collecting matches first, then delete, so deletions
/// cannot shift pagination offsets under the scan. Returns the delete count.
pub async fn purge_by_tag<C: Catalog>(catalog: &C, tag: &str) -> Result<usize> {
    let target = canonicalize_tag(tag);

    let mut marked: Vec<(CatalogEntry, String)> = Vec::new();
    let mut page = 1usize;
    loop {
        let entries = catalog.list_page(page, PURGE_PAGE_SIZE).await?;
        let short_page = entries.len() < PURGE_PAGE_SIZE;
        for entry in entries {
            if let Some(tag_name) = matched_tag(&entry, &target) {
                marked.push((entry, tag_name));
            }
        }
        if short_page {
            break;
        }
        page += 1;
    }

    info!("Scanned {} pages, {} entries to purge", page, marked.len());

    let mut deleted = 0usize;
    for (entry, tag_name) in marked {
        match catalog.delete(&entry.id).await {
            Ok(status) => {
                info!(
                    "Purged '{}' (id {}, tag '{}') -> {}",
                    entry.name, entry.id, tag_name, status
                );
                deleted += 1;
            }
            Err(e) => warn!("Purge delete failed for '{}' (id {}): {}", entry.name, entry.id, e),
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::mealie::TagRef;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Search(String),
        ListPage(usize),
        Delete(String),
        Create(String),
    }

    struct FakeCatalog {
        entries: Vec<CatalogEntry>,
        ops: Mutex<Vec<Op>>,
    }

    impl FakeCatalog {
        fn new(entries: Vec<CatalogEntry>) -> Self {
            Self {
                entries,
                ops: Mutex::new(Vec::new()),
            }
        }

        fn ops(&self) -> Vec<Op> {
            self.ops.lock().unwrap().clone()
        }
    }

    impl Catalog for FakeCatalog {
        async fn search(&self, name: &str) -> Result<Vec<CatalogEntry>> {
            self.ops.lock().unwrap().push(Op::Search(name.to_string()));
            Ok(self.entries.clone())
        }

        async fn list_page(&self, page: usize, per_page: usize) -> Result<Vec<CatalogEntry>> {
            self.ops.lock().unwrap().push(Op::ListPage(page));
            let start = (page - 1) * per_page;
            let end = (start + per_page).min(self.entries.len());
            if start >= self.entries.len() {
                return Ok(Vec::new());
            }
            Ok(self.entries[start..end].to_vec())
        }

        async fn delete(&self, id: &str) -> Result<StatusCode> {
            self.ops.lock().unwrap().push(Op::Delete(id.to_string()));
            Ok(StatusCode::OK)
        }

        async fn create_from_url(&self, url: &str) -> Result<StatusCode> {
            self.ops.lock().unwrap().push(Op::Create(url.to_string()));
            Ok(StatusCode::CREATED)
        }
    }

    fn entry(id: &str, name: &str, tags: &[(&str, &str)]) -> CatalogEntry {
        CatalogEntry {
            id: id.to_string(),
            name: name.to_string(),
            tags: tags
                .iter()
                .map(|(n, s)| TagRef {
                    name: n.to_string(),
                    slug: s.to_string(),
                })
                .collect(),
        }
    }

    fn record(name: &str, tags: &[&str]) -> RecipeRecord {
        RecipeRecord {
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn deletes_before_create() {
        let catalog = FakeCatalog::new(vec![
            entry("1", "Chili", &[]),
            entry("2", "chili", &[]),
        ]);
        reconcile(&catalog, &record("Chili", &[]), "http://x/chili.html", None)
            .await
            .unwrap();

        let ops = catalog.ops();
        let create_pos = ops.iter().position(|o| matches!(o, Op::Create(_))).unwrap();
        let last_delete = ops
            .iter()
            .rposition(|o| matches!(o, Op::Delete(_)))
            .unwrap();
        assert!(last_delete < create_pos, "create issued before a delete: {:?}", ops);
    }

    #[tokio::test]
    async fn only_exact_case_insensitive_match_is_deleted() {
        let catalog = FakeCatalog::new(vec![
            entry("1", "Chili", &[]),
            entry("2", "White Chili", &[]),
        ]);
        let outcome = reconcile(&catalog, &record("Chili", &[]), "http://x/chili.html", None)
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Imported { deleted: 1, .. }));
        let ops = catalog.ops();
        assert!(ops.contains(&Op::Delete("1".into())));
        assert!(!ops.contains(&Op::Delete("2".into())));
    }

    #[tokio::test]
    async fn missing_required_tag_skips_without_api_calls() {
        let catalog = FakeCatalog::new(vec![entry("1", "Chili", &[])]);
        let outcome = reconcile(
            &catalog,
            &record("Chili", &["Soups"]),
            "http://x/chili.html",
            Some("Desserts"),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::SkippedTag));
        assert!(catalog.ops().is_empty());
    }

    #[tokio::test]
    async fn tag_filter_is_case_folded() {
        let catalog = FakeCatalog::new(vec![]);
        let outcome = reconcile(
            &catalog,
            &record("Chili", &["Soups"]),
            "http://x/chili.html",
            Some("soups"),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Imported { .. }));
    }

    #[test]
    fn canonicalize_strips_non_alphanumerics() {
        assert_eq!(canonicalize_tag("Side Dishes"), "sidedishes");
        assert_eq!(canonicalize_tag("side-dishes"), "sidedishes");
        assert_eq!(canonicalize_tag("My Sisters' Kitchen"), "mysisterskitchen");
    }

    #[tokio::test]
    async fn purge_matches_tag_name_or_slug() {
        let catalog = FakeCatalog::new(vec![
            entry("1", "A", &[("Family", "")]),
            entry("2", "B", &[("", "family")]),
            entry("3", "C", &[("Other", "other")]),
        ]);
        let count = purge_by_tag(&catalog, "Family").await.unwrap();

        assert_eq!(count, 2);
        let ops = catalog.ops();
        assert!(ops.contains(&Op::Delete("1".into())));
        assert!(ops.contains(&Op::Delete("2".into())));
        assert!(!ops.contains(&Op::Delete("3".into())));
    }

    #[tokio::test]
    async fn purge_paginates_until_short_page() {
        let entries: Vec<CatalogEntry> = (0..250)
            .map(|i| entry(&i.to_string(), &format!("r{}", i), &[]))
            .collect();
        let catalog = FakeCatalog::new(entries);
        purge_by_tag(&catalog, "none").await.unwrap();

        let pages: Vec<Op> = catalog
            .ops()
            .into_iter()
            .filter(|o| matches!(o, Op::ListPage(_)))
            .collect();
        assert_eq!(pages, vec![Op::ListPage(1), Op::ListPage(2), Op::ListPage(3)]);
    }

    #[tokio::test]
    async fn purge_empty_catalog_is_zero() {
        let catalog = FakeCatalog::new(vec![]);
        assert_eq!(purge_by_tag(&catalog, "Family").await.unwrap(), 0);
    }
}
