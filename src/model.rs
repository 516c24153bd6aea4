//! Output record structures.
//!
//! Field order in each struct is the serialization order of the emitted
//! YAML/JSON documents. The absent-vs-null contract: fields that are only
//! meaningful for some card types carry `skip_serializing_if` (absent when
//! not applicable), while per-language slots inside the language maps are
//! always serialized, null when no translation exists.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer if the source string parses as one, otherwise the original text.
/// ATK/DEF values like "?" or "X000" must survive as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumOrString {
    Int(i64),
    Str(String),
}

impl NumOrString {
    pub fn parse(value: &str) -> Self {
        match value.trim().parse::<i64>() {
            Ok(number) => NumOrString::Int(number),
            Err(_) => NumOrString::Str(value.to_string()),
        }
    }
}

/// Source page identifier. File stems are integers in practice, but the
/// upstream scrape format is allowed to change, so keep the string form too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageId {
    Int(i64),
    Str(String),
}

impl PageId {
    pub fn from_stem(stem: &str) -> Self {
        match stem.parse::<i64>() {
            Ok(number) => PageId::Int(number),
            Err(_) => PageId::Str(stem.to_string()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PageId::Int(number) => Some(*number),
            PageId::Str(_) => None,
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageId::Int(number) => write!(f, "{}", number),
            PageId::Str(text) => write!(f, "{}", text),
        }
    }
}

/// Synthetic identifier for passwordless cards. Multi-region reissue sets
/// produce one candidate per region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FakePassword {
    One(i64),
    Many(Vec<i64>),
}

/// Card name in every output language. English is the primary key for
/// several merge sources and is always present.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NameMap {
    pub en: String,
    pub de: Option<String>,
    pub es: Option<String>,
    pub fr: Option<String>,
    pub it: Option<String>,
    pub pt: Option<String>,
    pub ja: Option<String>,
    pub ja_romaji: Option<String>,
    pub ko: Option<String>,
    pub ko_rr: Option<String>,
    #[serde(rename = "zh-TW")]
    pub zh_tw: Option<String>,
    #[serde(rename = "zh-CN")]
    pub zh_cn: Option<String>,
}

impl NameMap {
    pub fn get(&self, language: &str) -> Option<&str> {
        let slot = match language {
            "en" => return Some(&self.en),
            "de" => &self.de,
            "es" => &self.es,
            "fr" => &self.fr,
            "it" => &self.it,
            "pt" => &self.pt,
            "ja" => &self.ja,
            "ja_romaji" => &self.ja_romaji,
            "ko" => &self.ko,
            "ko_rr" => &self.ko_rr,
            "zh-TW" => &self.zh_tw,
            "zh-CN" => &self.zh_cn,
            _ => return None,
        };
        slot.as_deref()
    }

    pub fn set(&mut self, language: &str, value: String) {
        match language {
            "en" => self.en = value,
            "de" => self.de = Some(value),
            "es" => self.es = Some(value),
            "fr" => self.fr = Some(value),
            "it" => self.it = Some(value),
            "pt" => self.pt = Some(value),
            "ja" => self.ja = Some(value),
            "ja_romaji" => self.ja_romaji = Some(value),
            "ko" => self.ko = Some(value),
            "ko_rr" => self.ko_rr = Some(value),
            "zh-TW" => self.zh_tw = Some(value),
            "zh-CN" => self.zh_cn = Some(value),
            _ => {}
        }
    }
}

/// Localized multi-line text (card text, pendulum effect, requirement, ...).
#[derive(Debug, Clone, Default, Serialize)]
pub struct TextMap {
    pub en: Option<String>,
    pub de: Option<String>,
    pub es: Option<String>,
    pub fr: Option<String>,
    pub it: Option<String>,
    pub pt: Option<String>,
    pub ja: Option<String>,
    pub ko: Option<String>,
    #[serde(rename = "zh-TW")]
    pub zh_tw: Option<String>,
    #[serde(rename = "zh-CN")]
    pub zh_cn: Option<String>,
}

impl TextMap {
    pub fn get(&self, language: &str) -> Option<&str> {
        let slot = match language {
            "en" => &self.en,
            "de" => &self.de,
            "es" => &self.es,
            "fr" => &self.fr,
            "it" => &self.it,
            "pt" => &self.pt,
            "ja" => &self.ja,
            "ko" => &self.ko,
            "zh-TW" => &self.zh_tw,
            "zh-CN" => &self.zh_cn,
            _ => return None,
        };
        slot.as_deref()
    }

    pub fn set(&mut self, language: &str, value: String) {
        match language {
            "en" => self.en = Some(value),
            "de" => self.de = Some(value),
            "es" => self.es = Some(value),
            "fr" => self.fr = Some(value),
            "it" => self.it = Some(value),
            "pt" => self.pt = Some(value),
            "ja" => self.ja = Some(value),
            "ko" => self.ko = Some(value),
            "zh-TW" => self.zh_tw = Some(value),
            "zh-CN" => self.zh_cn = Some(value),
            _ => {}
        }
    }
}

/// One historical release of a card in a specific set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Printing {
    pub set_number: String,
    pub set_name: String,
    pub rarities: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardImage {
    pub index: NumOrString,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub illustration: Option<String>,
}

/// Printings grouped by output language. A language key is absent (not an
/// empty list) when the card was never released in that language.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SetsByLanguage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub en: Option<Vec<Printing>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub de: Option<Vec<Printing>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub es: Option<Vec<Printing>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fr: Option<Vec<Printing>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub it: Option<Vec<Printing>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pt: Option<Vec<Printing>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ja: Option<Vec<Printing>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ko: Option<Vec<Printing>>,
    #[serde(rename = "zh-TW", skip_serializing_if = "Option::is_none")]
    pub zh_tw: Option<Vec<Printing>>,
    #[serde(rename = "zh-CN", skip_serializing_if = "Option::is_none")]
    pub zh_cn: Option<Vec<Printing>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LimitRegulation {
    pub tcg: Option<String>,
    pub ocg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
}

/// OCG/TCG Fusion material lines are a single English string on the card
/// table; Rush Duel cards localize them.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Materials {
    Line(String),
    Localized(TextMap),
}

/// Per-field, per-language markers for values sourced from fan translations.
pub type UnofficialFlags = BTreeMap<String, BTreeMap<String, bool>>;

/// Canonical record for OCG/TCG and Rush Duel cards.
#[derive(Debug, Clone, Serialize)]
pub struct CardRecord {
    pub konami_id: Option<i64>,
    pub password: Option<i64>,
    pub name: NameMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summoning_condition: Option<TextMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirement: Option<TextMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<TextMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuous_effect: Option<TextMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_choice_effect: Option<TextMap>,
    pub card_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monster_type_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_arrows: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atk: Option<NumOrString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub def: Option<NumOrString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_atk: Option<NumOrString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pendulum_scale: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pendulum_effect: Option<TextMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ritual_spell: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub materials: Option<Materials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legend: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<CardImage>>,
    pub sets: SetsByLanguage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_regulation: Option<LimitRegulation>,
    pub yugipedia_page_id: PageId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fake_password: Option<FakePassword>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md_rarity: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub is_translation_unofficial: UnofficialFlags,
}

impl CardRecord {
    pub fn new(
        konami_id: Option<i64>,
        password: Option<i64>,
        name: NameMap,
        yugipedia_page_id: PageId,
    ) -> Self {
        CardRecord {
            konami_id,
            password,
            name,
            text: None,
            summoning_condition: None,
            requirement: None,
            effect: None,
            continuous_effect: None,
            multi_choice_effect: None,
            card_type: String::new(),
            property: None,
            monster_type_line: None,
            attribute: None,
            level: None,
            rank: None,
            link_arrows: None,
            atk: None,
            def: None,
            maximum_atk: None,
            pendulum_scale: None,
            pendulum_effect: None,
            ritual_spell: None,
            materials: None,
            legend: None,
            series: None,
            images: None,
            sets: SetsByLanguage::default(),
            limit_regulation: None,
            yugipedia_page_id,
            fake_password: None,
            md_rarity: None,
            is_translation_unofficial: UnofficialFlags::new(),
        }
    }

    /// The text map a Korean or Master Duel text merge should land in.
    /// OCG/TCG cards always carry `text`; Rush effect cards store their text
    /// under one of the effect keys instead.
    pub fn primary_text_mut(&mut self) -> Option<&mut TextMap> {
        self.text
            .as_mut()
            .or(self.effect.as_mut())
            .or(self.continuous_effect.as_mut())
            .or(self.multi_choice_effect.as_mut())
    }

    pub fn mark_unofficial(&mut self, field: &str, language: &str) {
        self.is_translation_unofficial
            .entry(field.to_string())
            .or_default()
            .insert(language.to_string(), true);
    }
}

/// Speed Duel skill cards keep the simpler historical shape: no Konami
/// database id or password, and always a page-id basename.
#[derive(Debug, Clone, Serialize)]
pub struct SkillRecord {
    pub name: NameMap,
    pub type_line: Option<String>,
    pub activation: TextMap,
    pub effect: TextMap,
    pub character: Option<String>,
    pub image_front: Option<String>,
    pub image_back: Option<String>,
    pub sets: SetsByLanguage,
    pub yugipedia_page_id: PageId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Record {
    Card(Box<CardRecord>),
    Skill(Box<SkillRecord>),
}

#[cfg(test)]
mod model_tests {
    use super::*;

    #[test]
    fn num_or_string_keeps_unknown_atk() {
        assert_eq!(NumOrString::parse("2500"), NumOrString::Int(2500));
        assert_eq!(NumOrString::parse("?"), NumOrString::Str("?".to_string()));
        assert_eq!(
            NumOrString::parse("X000"),
            NumOrString::Str("X000".to_string())
        );
    }

    #[test]
    fn page_id_from_stem() {
        assert_eq!(PageId::from_stem("12345"), PageId::Int(12345));
        assert_eq!(
            PageId::from_stem("draft_4"),
            PageId::Str("draft_4".to_string())
        );
    }

    #[test]
    fn conditional_fields_absent_from_json() {
        let record = CardRecord::new(Some(4007), None, NameMap::default(), PageId::Int(42));
        let json = serde_json::to_value(&record).unwrap();
        let object = json.as_object().unwrap();
        assert!(object.contains_key("konami_id"));
        assert!(object.contains_key("password"));
        assert!(!object.contains_key("level"));
        assert!(!object.contains_key("property"));
        assert!(!object.contains_key("is_translation_unofficial"));
        assert!(object["password"].is_null());
    }

    #[test]
    fn language_map_renames() {
        let mut name = NameMap::default();
        name.set("zh-TW", "青眼白龍".to_string());
        let json = serde_json::to_value(&name).unwrap();
        assert_eq!(json["zh-TW"], "青眼白龍");
        assert!(json["zh-CN"].is_null());
    }
}
