//! Page loading and card-table field extraction.
//!
//! A page document is `{title, wikitext}`. Extraction locates the card-table
//! template, strips each argument value down to clean text, and flattens the
//! result into a string-keyed property map. Empty values are elided at
//! insertion so downstream code can treat "absent" and "blank" the same way.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::markup::{self, ParsedMarkup};
use crate::model::UnofficialFlags;

/// Name of the card-table template every entity kind extracts from.
pub const CARD_TABLE: &str = "CardTable2";

/// Wiki language names used by the unofficial-translation marker templates,
/// mapped to the output language codes. "Chinese" marks both Chinese slots.
const UNOFFICIAL_LANGUAGES: &[(&str, &str)] = &[
    ("English", "en"),
    ("German", "de"),
    ("Spanish", "es"),
    ("French", "fr"),
    ("Italian", "it"),
    ("Portuguese", "pt"),
    ("Japanese", "ja"),
    ("Korean", "ko"),
    ("Chinese", "zh"),
];

lazy_static! {
    static ref BR_TAG: Regex = Regex::new(r"(?i)<br\s*/?>").unwrap();
}

#[derive(Debug, Deserialize)]
pub struct PageSource {
    pub title: String,
    pub wikitext: String,
}

pub fn load_page(path: &Path) -> anyhow::Result<PageSource> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let page: PageSource = serde_yaml::from_reader(file)
        .with_context(|| format!("parsing page document {}", path.display()))?;
    Ok(page)
}

/// Cleaned card-table arguments, keyed by argument name.
#[derive(Debug, Default)]
pub struct PropertyMap {
    fields: BTreeMap<String, String>,
    pub unofficial: UnofficialFlags,
}

impl PropertyMap {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|v| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.fields.remove(key)
    }

    /// Empty values are dropped rather than stored, so a blank `|def=`
    /// argument reads back the same as a missing one.
    pub fn insert(&mut self, key: &str, value: String) {
        if !value.is_empty() {
            self.fields.insert(key.to_string(), value);
        }
    }
}

/// Flatten the first `target` template of the page into a property map.
/// Returns None when the page carries no such template (redirects, set
/// pages, and other non-card pages).
pub fn extract_fields(
    parsed: &ParsedMarkup,
    title: &str,
    target: &str,
) -> Option<PropertyMap> {
    let table_index = parsed
        .templates
        .iter()
        .position(|t| t.name.trim() == target)?;

    let mut properties = PropertyMap::default();

    // Marker templates placed before the card table flag fan translations.
    for template in &parsed.templates[..table_index] {
        let field = match template.name.trim() {
            "Unofficial name" => "name",
            "Unofficial lore" => "text",
            _ => continue,
        };
        // The marker takes one comma-separated language list; any extra
        // arguments are stray markup and ignored.
        let languages = template.positional(1).unwrap_or("");
        for language in languages.split(',') {
            let language = language.trim();
            for (english, code) in UNOFFICIAL_LANGUAGES {
                if *english == language {
                    properties
                        .unofficial
                        .entry(field.to_string())
                        .or_default()
                        .insert(code.to_string(), true);
                }
            }
        }
    }

    let table = &parsed.templates[table_index];
    for argument in &table.arguments {
        let raw = BR_TAG.replace_all(argument.value.trim(), "\n");
        let cleaned = markup::clean_value(&raw);
        properties.insert(argument.name.trim(), cleaned);
    }

    // The English name column is usually omitted because the page title
    // already carries it, minus any disambiguation parenthetical.
    if let Some(name) = properties.remove("name") {
        properties.insert("en_name", name);
    }
    if !properties.contains("en_name") {
        let from_title = title.split('(').next().unwrap_or(title).trim();
        properties.insert("en_name", from_title.to_string());
    }

    Some(properties)
}

#[cfg(test)]
mod extract_tests {
    use super::*;
    use crate::markup::parse;

    #[test]
    fn extracts_cleaned_fields() {
        let parsed = parse(
            "{{CardTable2\n| ja_name = {{Ruby|壺|つぼ}}\n| atk = 2500\n| types = [[Dragon]] / [[Normal Monster|Normal]]\n}}",
        );
        let map = extract_fields(&parsed, "Blue-Eyes White Dragon", CARD_TABLE).unwrap();
        assert_eq!(map.get("ja_name"), Some("<ruby>壺<rt>つぼ</rt></ruby>"));
        assert_eq!(map.get("atk"), Some("2500"));
        assert_eq!(map.get("types"), Some("Dragon / Normal"));
    }

    #[test]
    fn pages_without_card_table_are_skipped() {
        let parsed = parse("{{Infobox set | name = Legend of Blue Eyes }}");
        assert!(extract_fields(&parsed, "Legend of Blue Eyes", CARD_TABLE).is_none());
    }

    #[test]
    fn blank_values_are_elided() {
        let parsed = parse("{{CardTable2 | def = | atk = 0 }}");
        let map = extract_fields(&parsed, "Some Card", CARD_TABLE).unwrap();
        assert!(!map.contains("def"));
        assert_eq!(map.get("atk"), Some("0"));
    }

    #[test]
    fn en_name_falls_back_to_title_without_parenthetical() {
        let parsed = parse("{{CardTable2 | atk = 100 }}");
        let map = extract_fields(&parsed, "Kuriboh (Rush Duel)", CARD_TABLE).unwrap();
        assert_eq!(map.get("en_name"), Some("Kuriboh"));
    }

    #[test]
    fn explicit_name_wins_over_title() {
        let parsed = parse("{{CardTable2 | name = Gemini Elf }}");
        let map = extract_fields(&parsed, "Gemini Elf (card)", CARD_TABLE).unwrap();
        assert_eq!(map.get("en_name"), Some("Gemini Elf"));
    }

    #[test]
    fn br_tags_become_newlines() {
        let parsed = parse("{{CardTable2 | lore = First line.<br />Second line. }}");
        let map = extract_fields(&parsed, "Card", CARD_TABLE).unwrap();
        assert_eq!(map.get("lore"), Some("First line.\nSecond line."));
    }

    #[test]
    fn unofficial_markers_before_table_set_flags() {
        let parsed = parse(
            "{{Unofficial name|German, French}}\n{{Unofficial lore|German}}\n{{CardTable2 | atk = 0 }}",
        );
        let map = extract_fields(&parsed, "Card", CARD_TABLE).unwrap();
        assert_eq!(map.unofficial["name"]["de"], true);
        assert_eq!(map.unofficial["name"]["fr"], true);
        assert_eq!(map.unofficial["text"]["de"], true);
        assert!(!map.unofficial["text"].contains_key("fr"));
    }

    #[test]
    fn unofficial_marker_reads_only_the_language_list() {
        let parsed = parse("{{Unofficial name|German|French}}\n{{CardTable2 | atk = 0 }}");
        let map = extract_fields(&parsed, "Card", CARD_TABLE).unwrap();
        assert_eq!(map.unofficial["name"]["de"], true);
        assert!(!map.unofficial["name"].contains_key("fr"));
    }
}
