//! Secondary-source annotation.
//!
//! Every lookup table is loaded once at startup into a `MergeSources` value
//! and treated as read-only for the rest of the run. Application order per
//! card: official Korean database (overwrite), Master Duel dataset
//! (fill-only), Korean override table (overwrite, always wins), Korean
//! prerelease table (fill-only), then limit regulation and fake passwords.
//! The zh-CN store is different: it pre-annotates the property map before
//! transformation rather than patching the finished record.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{info, warn};
use serde::Deserialize;

use crate::extract::PropertyMap;
use crate::markup::replace_interlinear_annotations;
use crate::model::CardRecord;
use crate::transform::Kind;

/// One row of a Korean translation table. Empty cells mean "not specified".
#[derive(Debug, Clone)]
pub struct KoRow {
    pub name: Option<String>,
    pub text: Option<String>,
    pub pendulum: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnreleasedStatus {
    pub tcg: Option<String>,
    pub ocg: Option<String>,
}

/// Per-language name/text maps from the Master Duel aggregate, keyed in the
/// merge by English name.
#[derive(Debug, Deserialize)]
pub struct MasterDuelCard {
    pub name: HashMap<String, Option<String>>,
    pub text: HashMap<String, Option<String>>,
    pub md_rarity: Option<String>,
}

/// All optional secondary sources for a run, loaded once and shared
/// read-only across workers.
#[derive(Default)]
pub struct MergeSources {
    pub zh_cn_dir: Option<PathBuf>,
    pub ko_official: Option<HashMap<i64, KoRow>>,
    pub ko_override: Option<HashMap<i64, KoRow>>,
    pub ko_prerelease: Option<HashMap<i64, KoRow>>,
    pub master_duel: Option<HashMap<String, MasterDuelCard>>,
    pub tcg_vector: Option<HashMap<String, Option<i64>>>,
    pub ocg_vector: Option<HashMap<String, Option<i64>>>,
    pub unreleased: Option<HashMap<String, UnreleasedStatus>>,
}

/// The one English name shared by a Normal Monster and a Ritual Monster;
/// a name-keyed Master Duel lookup would pick the wrong card.
const MASTER_DUEL_AMBIGUOUS_NAME: &str = "Lycanthrope";

const LANGUAGES: &[&str] = &[
    "en", "de", "es", "fr", "it", "pt", "ja", "ko", "zh-TW", "zh-CN",
];

/// Load a comma- or tab-delimited Korean translation table keyed by the
/// given column. The official export is UTF-8 with a BOM, which the header
/// lookup has to tolerate.
pub fn load_ko_table(
    path: &Path,
    key_column: &str,
    delimiter: u8,
) -> anyhow::Result<HashMap<i64, KoRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("reading headers of {}", path.display()))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let key_index = column(key_column)
        .with_context(|| format!("{} missing column `{}`", path.display(), key_column))?;
    let name_index = column("name");
    let text_index = column("text");
    let pendulum_index = column("pendulum");

    let cell = |row: &csv::StringRecord, index: Option<usize>| {
        index
            .and_then(|i| row.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let mut table = HashMap::new();
    for row in reader.records() {
        let row = row.with_context(|| format!("reading {}", path.display()))?;
        let key: i64 = match row.get(key_index).map(str::trim) {
            Some(raw) => match raw.parse() {
                Ok(key) => key,
                Err(_) => {
                    warn!("{}: non-numeric key {:?}", path.display(), raw);
                    continue;
                }
            },
            None => continue,
        };
        table.insert(
            key,
            KoRow {
                name: cell(&row, name_index),
                text: cell(&row, text_index),
                pendulum: cell(&row, pendulum_index),
            },
        );
    }
    Ok(table)
}

pub fn load_master_duel(path: &Path) -> anyhow::Result<HashMap<String, MasterDuelCard>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let cards: Vec<MasterDuelCard> = serde_json::from_reader(file)
        .with_context(|| format!("parsing Master Duel aggregate {}", path.display()))?;
    Ok(cards
        .into_iter()
        .filter_map(|card| card.name.get("en").cloned().flatten().map(|en| (en, card)))
        .collect())
}

pub fn load_vector(path: &Path) -> anyhow::Result<HashMap<String, Option<i64>>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("parsing regulation vector {}", path.display()))
}

pub fn load_unreleased(path: &Path) -> anyhow::Result<HashMap<String, UnreleasedStatus>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("parsing unreleased table {}", path.display()))
}

#[derive(Debug, Deserialize)]
struct ZhCnEntry {
    name: String,
    text: String,
    pendulum: Option<String>,
}

/// Pre-annotation step: inject the secondary-region translation for this
/// card's password into the property map, under keys the transformer treats
/// as fill-only fallbacks.
pub fn annotate_zh_cn(zh_cn_dir: &Path, fields: &mut PropertyMap) -> anyhow::Result<()> {
    let password = match crate::transform::int_or_none(fields, "password") {
        Some(password) => password,
        None => return Ok(()),
    };
    let path = zh_cn_dir.join(format!("{}.yaml", password));
    if !path.is_file() {
        return Ok(());
    }
    info!("zh-CN: {}", path.display());
    let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    let entry: ZhCnEntry = serde_yaml::from_reader(file)
        .with_context(|| format!("parsing zh-CN document {}", path.display()))?;
    fields.insert("ourocg_name", entry.name);
    fields.insert("ourocg_text", entry.text);
    if let Some(pendulum) = entry.pendulum {
        fields.insert("ourocg_pendulum", pendulum);
    }
    Ok(())
}

/// Official database values replace the wiki-sourced Korean fields, with a
/// diff logged when the two disagree.
pub fn apply_ko_official(record: &mut CardRecord, table: &HashMap<i64, KoRow>) {
    let row = match record.konami_id.and_then(|id| table.get(&id)) {
        Some(row) => row,
        None => return,
    };
    if let Some(name) = &row.name {
        let name = replace_interlinear_annotations(name);
        if let Some(existing) = record.name.get("ko") {
            if existing != name.as_str() {
                warn!("ko name differs from official database: {:?} vs {:?}", existing, name);
            }
        }
        record.name.set("ko", name);
    }
    if let Some(text) = &row.text {
        let en_name = record.name.en.clone();
        if let Some(texts) = record.primary_text_mut() {
            if texts.get("ko").is_some_and(|existing| existing != text.as_str()) {
                warn!("ko text differs from official database for {}", en_name);
            }
            texts.set("ko", text.clone());
        }
    }
    if let Some(pendulum) = &row.pendulum {
        if let Some(effects) = record.pendulum_effect.as_mut() {
            effects.set("ko", pendulum.clone());
        }
    }
}

/// Manual overrides always win; they exist to correct both the wiki and
/// the official export.
pub fn apply_ko_override(record: &mut CardRecord, table: &HashMap<i64, KoRow>) {
    let row = match record.konami_id.and_then(|id| table.get(&id)) {
        Some(row) => row,
        None => return,
    };
    if let Some(name) = &row.name {
        record.name.set("ko", replace_interlinear_annotations(name));
    }
    if let Some(text) = &row.text {
        if let Some(texts) = record.primary_text_mut() {
            texts.set("ko", text.clone());
        }
    }
    if let Some(pendulum) = &row.pendulum {
        if let Some(effects) = record.pendulum_effect.as_mut() {
            effects.set("ko", pendulum.clone());
        }
    }
}

/// Prerelease translations only apply to cards with no Korean release yet,
/// and everything they inject is flagged unofficial.
pub fn apply_ko_prerelease(record: &mut CardRecord, table: &HashMap<i64, KoRow>) {
    let page_id = match record.yugipedia_page_id.as_int() {
        Some(page_id) => page_id,
        None => return,
    };
    let row = match table.get(&page_id) {
        Some(row) => row,
        None => return,
    };
    if record.name.get("ko").is_some() {
        return;
    }
    if let Some(name) = &row.name {
        record.name.set("ko", replace_interlinear_annotations(name));
        record.mark_unofficial("name", "ko");
    }
    if let Some(text) = &row.text {
        if let Some(texts) = record.primary_text_mut() {
            if texts.get("ko").is_none() {
                texts.set("ko", text.clone());
                record.mark_unofficial("text", "ko");
            }
        }
    }
    if let Some(pendulum) = &row.pendulum {
        if let Some(effects) = record.pendulum_effect.as_mut() {
            if effects.get("ko").is_none() {
                effects.set("ko", pendulum.clone());
                record.mark_unofficial("pendulum_effect", "ko");
            }
        }
    }
}

/// Fill-only merge from the digital game's aggregate, plus its rarity as a
/// bonus field.
pub fn apply_master_duel(record: &mut CardRecord, table: &HashMap<String, MasterDuelCard>) {
    if record.name.en == MASTER_DUEL_AMBIGUOUS_NAME {
        return;
    }
    let card = match table.get(&record.name.en) {
        Some(card) => card,
        None => return,
    };
    for language in LANGUAGES {
        if record.name.get(language).is_none() {
            if let Some(name) = card.name.get(*language).and_then(|v| v.as_ref()) {
                record.name.set(language, name.clone());
            }
        }
    }
    if let Some(texts) = record.primary_text_mut() {
        for language in LANGUAGES {
            if texts.get(language).is_none() {
                if let Some(text) = card.text.get(*language).and_then(|v| v.as_ref()) {
                    texts.set(language, text.clone());
                }
            }
        }
    }
    if record.md_rarity.is_none() {
        record.md_rarity = card.md_rarity.clone();
    }
}

const LIMIT_STATUSES: &[(i64, &str)] = &[(0, "Forbidden"), (1, "Limited"), (2, "Semi-Limited")];

fn limit_status(value: Option<i64>) -> String {
    LIMIT_STATUSES
        .iter()
        .find(|(code, _)| Some(*code) == value)
        .map(|(_, status)| status.to_string())
        .unwrap_or_else(|| "Unlimited".to_string())
}

/// Numeric-vector and unreleased-table regulation statuses. The unreleased
/// table applies first, skipping cards it marks Illegal in either format
/// (promos). A vector entry then overrides the wiki status unless that
/// status is "Not yet released" and the card has no printing in the
/// vector's region.
pub fn annotate_limit_regulation(record: &mut CardRecord, sources: &MergeSources) {
    let regulation = match record.limit_regulation.as_mut() {
        Some(regulation) => regulation,
        None => return,
    };
    if let Some(unreleased) = &sources.unreleased {
        if let Some(status) = unreleased.get(&record.name.en) {
            let illegal = |value: &Option<String>| value.as_deref() == Some("Illegal");
            if !illegal(&status.tcg) && !illegal(&status.ocg) {
                if let Some(tcg) = &status.tcg {
                    regulation.tcg = Some(tcg.clone());
                }
                if let Some(ocg) = &status.ocg {
                    regulation.ocg = Some(ocg.clone());
                }
            }
        }
    }
    if let Some(vector) = &sources.tcg_vector {
        if let Some(konami_id) = record.konami_id {
            let unreleased_here = regulation.tcg.as_deref() == Some("Not yet released")
                && record.sets.en.is_none();
            if !unreleased_here {
                regulation.tcg =
                    Some(limit_status(vector.get(&konami_id.to_string()).copied().flatten()));
            }
        }
    }
    if let Some(vector) = &sources.ocg_vector {
        if !record.name.en.is_empty() {
            let unreleased_here = regulation.ocg.as_deref() == Some("Not yet released")
                && record.sets.ja.is_none();
            if !unreleased_here {
                regulation.ocg =
                    Some(limit_status(vector.get(&record.name.en).copied().flatten()));
            }
        }
    }
}

/// Run the post-transform merge chain appropriate for the entity kind.
pub fn apply(kind: Kind, record: &mut CardRecord, sources: &MergeSources) {
    if let Some(table) = &sources.ko_official {
        apply_ko_official(record, table);
    }
    if kind == Kind::OcgTcg {
        if let Some(table) = &sources.master_duel {
            apply_master_duel(record, table);
        }
    }
    if let Some(table) = &sources.ko_override {
        apply_ko_override(record, table);
    }
    if let Some(table) = &sources.ko_prerelease {
        apply_ko_prerelease(record, table);
    }
    if kind == Kind::OcgTcg {
        annotate_limit_regulation(record, sources);
    }
}

#[cfg(test)]
mod merge_tests {
    use super::*;
    use crate::model::{LimitRegulation, NameMap, PageId, Printing, TextMap};

    fn base_record() -> CardRecord {
        let mut name = NameMap::default();
        name.en = "Test Card".to_string();
        let mut record = CardRecord::new(Some(1234), Some(10000), name, PageId::Int(42));
        record.text = Some(TextMap::default());
        record.limit_regulation = Some(LimitRegulation::default());
        record
    }

    fn row(name: &str) -> KoRow {
        KoRow {
            name: Some(name.to_string()),
            text: None,
            pendulum: None,
        }
    }

    #[test]
    fn override_beats_fill_only_sources() {
        let mut record = base_record();
        let mut sources = MergeSources::default();
        sources.ko_prerelease = Some(HashMap::from([(42, row("프리릴리즈"))]));
        sources.ko_override = Some(HashMap::from([(1234, row("오버라이드"))]));
        apply(Kind::OcgTcg, &mut record, &sources);
        assert_eq!(record.name.get("ko"), Some("오버라이드"));
    }

    #[test]
    fn prerelease_fills_and_flags_only_when_empty() {
        let mut record = base_record();
        let mut table = HashMap::new();
        table.insert(
            42,
            KoRow {
                name: Some("이름".to_string()),
                text: Some("텍스트".to_string()),
                pendulum: None,
            },
        );
        apply_ko_prerelease(&mut record, &table);
        assert_eq!(record.name.get("ko"), Some("이름"));
        assert_eq!(record.is_translation_unofficial["name"]["ko"], true);
        assert_eq!(record.is_translation_unofficial["text"]["ko"], true);

        let mut released = base_record();
        released.name.set("ko", "공식 이름".to_string());
        apply_ko_prerelease(&mut released, &table);
        assert_eq!(released.name.get("ko"), Some("공식 이름"));
        assert!(released.is_translation_unofficial.is_empty());
    }

    #[test]
    fn official_database_overwrites_and_rewrites_annotations() {
        let mut record = base_record();
        record.name.set("ko", "위키 이름".to_string());
        let table = HashMap::from([(1234, row("\u{fff9}강귀\u{fffa}강림\u{fffb}"))]);
        apply_ko_official(&mut record, &table);
        assert_eq!(
            record.name.get("ko"),
            Some("<ruby>강귀<rt>강림</rt></ruby>")
        );
    }

    #[test]
    fn official_database_replaces_differing_text() {
        let mut record = base_record();
        record.text.as_mut().unwrap().set("ko", "위키 텍스트".to_string());
        let table = HashMap::from([(
            1234,
            KoRow {
                name: None,
                text: Some("공식 텍스트".to_string()),
                pendulum: None,
            },
        )]);
        apply_ko_official(&mut record, &table);
        assert_eq!(
            record.text.as_ref().unwrap().get("ko"),
            Some("공식 텍스트")
        );
    }

    #[test]
    fn master_duel_fills_without_overwriting() {
        let mut record = base_record();
        record.name.set("ja", "ウィキの名前".to_string());
        let card = MasterDuelCard {
            name: HashMap::from([
                ("en".to_string(), Some("Test Card".to_string())),
                ("ja".to_string(), Some("MDの名前".to_string())),
                ("de".to_string(), Some("Testkarte".to_string())),
                ("fr".to_string(), None),
            ]),
            text: HashMap::new(),
            md_rarity: Some("UR".to_string()),
        };
        let table = HashMap::from([("Test Card".to_string(), card)]);
        apply_master_duel(&mut record, &table);
        assert_eq!(record.name.get("ja"), Some("ウィキの名前"));
        assert_eq!(record.name.get("de"), Some("Testkarte"));
        assert_eq!(record.md_rarity.as_deref(), Some("UR"));
    }

    #[test]
    fn master_duel_skips_the_ambiguous_name() {
        let mut record = base_record();
        record.name.en = "Lycanthrope".to_string();
        let card = MasterDuelCard {
            name: HashMap::from([("en".to_string(), Some("Lycanthrope".to_string()))]),
            text: HashMap::new(),
            md_rarity: Some("SR".to_string()),
        };
        let table = HashMap::from([("Lycanthrope".to_string(), card)]);
        apply_master_duel(&mut record, &table);
        assert!(record.md_rarity.is_none());
    }

    #[test]
    fn vector_overrides_except_unreleased_without_printing() {
        let mut sources = MergeSources::default();
        sources.tcg_vector = Some(HashMap::from([("1234".to_string(), Some(1))]));

        let mut record = base_record();
        record.sets.en = Some(vec![Printing {
            set_number: "LOB-EN001".to_string(),
            set_name: "Set".to_string(),
            rarities: None,
        }]);
        record.limit_regulation.as_mut().unwrap().tcg = Some("Not yet released".to_string());
        annotate_limit_regulation(&mut record, &sources);
        assert_eq!(
            record.limit_regulation.as_ref().unwrap().tcg.as_deref(),
            Some("Limited")
        );

        let mut unreleased = base_record();
        unreleased.limit_regulation.as_mut().unwrap().tcg = Some("Not yet released".to_string());
        annotate_limit_regulation(&mut unreleased, &sources);
        assert_eq!(
            unreleased.limit_regulation.as_ref().unwrap().tcg.as_deref(),
            Some("Not yet released")
        );
    }

    #[test]
    fn absent_vector_entry_means_unlimited() {
        let mut sources = MergeSources::default();
        sources.tcg_vector = Some(HashMap::new());
        let mut record = base_record();
        annotate_limit_regulation(&mut record, &sources);
        assert_eq!(
            record.limit_regulation.as_ref().unwrap().tcg.as_deref(),
            Some("Unlimited")
        );
    }

    #[test]
    fn unreleased_table_skips_illegal_promos() {
        let mut sources = MergeSources::default();
        sources.unreleased = Some(HashMap::from([(
            "Test Card".to_string(),
            UnreleasedStatus {
                tcg: Some("Illegal".to_string()),
                ocg: Some("Unlimited".to_string()),
            },
        )]));
        let mut record = base_record();
        annotate_limit_regulation(&mut record, &sources);
        assert!(record.limit_regulation.as_ref().unwrap().ocg.is_none());
    }
}
