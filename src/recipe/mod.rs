pub mod jsonld;

use serde::Deserialize;

/// A recipe as recovered from one source page or scanned-page block.
/// Ephemeral: the name is the only join key against the catalog.
#[derive(Debug, Clone, Default)]
pub struct RecipeRecord {
    pub name: String,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
}

impl RecipeRecord {
    /// Case-folded tag containment, used by the import tag filter.
    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = tag.to_lowercase();
        self.tags.iter().any(|t| t.to_lowercase() == wanted)
    }
}

/// The `keywords` field appears either as a delimited string or as an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Keywords {
    List(Vec<String>),
    Delimited(String),
}

impl Keywords {
    /// Normalize both shapes to an ordered list of trimmed, non-empty tags.
    pub fn into_tags(self) -> Vec<String> {
        match self {
            Keywords::List(items) => items
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Keywords::Delimited(s) => s
                .split([',', ';'])
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }
}

/// One instruction step: either a bare string or a HowToStep-style object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Instruction {
    Structured {
        text: String,
    },
    Plain(String),
}

impl Instruction {
    pub fn into_text(self) -> String {
        match self {
            Instruction::Structured { text } => text,
            Instruction::Plain(text) => text,
        }
    }
}

/// Flatten a mixed instruction list to plain step strings, dropping empties.
pub fn normalize_steps(steps: Vec<Instruction>) -> Vec<String> {
    steps
        .into_iter()
        .map(Instruction::into_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Filesystem-safe slug: lowercase, non-alphanumeric runs collapse to a
/// single underscore, no leading/trailing underscores.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.to_lowercase().chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_collapses_punctuation() {
        assert_eq!(
            slug("Apple & Walnut, Cranberry Salad!"),
            "apple_walnut_cranberry_salad"
        );
    }

    #[test]
    fn slug_trims_edges() {
        assert_eq!(slug("  Chili  "), "chili");
        assert_eq!(slug("---"), "");
    }

    #[test]
    fn slug_keeps_digits() {
        assert_eq!(slug("5-Minute Fudge"), "5_minute_fudge");
    }

    #[test]
    fn keywords_delimited_splits_on_comma_and_semicolon() {
        let kw = Keywords::Delimited("A, B ; C".to_string());
        assert_eq!(kw.into_tags(), vec!["A", "B", "C"]);
    }

    #[test]
    fn keywords_list_passes_through() {
        let kw = Keywords::List(vec!["A".into(), "B".into()]);
        assert_eq!(kw.into_tags(), vec!["A", "B"]);
    }

    #[test]
    fn keywords_drops_empty_pieces() {
        let kw = Keywords::Delimited(", Soups ;; ".to_string());
        assert_eq!(kw.into_tags(), vec!["Soups"]);
    }

    #[test]
    fn instructions_mixed_shapes() {
        let raw = serde_json::json!([
            "Chop the onions.",
            { "@type": "HowToStep", "text": "Simmer 20 minutes." }
        ]);
        let steps: Vec<Instruction> = serde_json::from_value(raw).unwrap();
        assert_eq!(
            normalize_steps(steps),
            vec!["Chop the onions.", "Simmer 20 minutes."]
        );
    }

    #[test]
    fn has_tag_is_case_folded() {
        let record = RecipeRecord {
            tags: vec!["Soups".into()],
            ..Default::default()
        };
        assert!(record.has_tag("soups"));
        assert!(!record.has_tag("salads"));
    }
}
