//! Property map to record mapping, per entity kind.
//!
//! One pipeline handles all three kinds; the kind picks the skip-rule list
//! and the record shape. Skip rules are data, not control flow, because the
//! sentinel set has grown over time and each addition should be a table
//! entry with a reason string, not another branch.

use anyhow::{anyhow, bail};
use log::{info, warn};

use crate::extract::PropertyMap;
use crate::model::{
    CardImage, CardRecord, LimitRegulation, Materials, NameMap, NumOrString, PageId, Printing,
    Record, SetsByLanguage, SkillRecord, TextMap,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Kind {
    /// Primary game cards (full merge chain, limit regulation, passwords).
    OcgTcg,
    /// Rush Duel cards (no passwords, localized materials, legends).
    Rush,
    /// Speed Duel skill cards.
    Speed,
}

/// One reason a page is out of catalog scope.
pub struct SkipRule {
    pub reason: &'static str,
    matches: fn(&PropertyMap) -> bool,
}

fn no_database_entry(fields: &PropertyMap) -> bool {
    fields.get("database_id") == Some("none")
}

fn no_database_entry_or_placeholder(fields: &PropertyMap) -> bool {
    matches!(fields.get("database_id"), Some("none") | Some("???"))
}

fn limitation_text(fields: &PropertyMap) -> bool {
    fields.contains("limitation_text")
}

fn illegal_status(fields: &PropertyMap) -> bool {
    fields.get("ocg_status") == Some("Illegal")
}

/// Leaked cards get "???" placeholders until their stats are confirmed.
fn placeholder_stats(fields: &PropertyMap) -> bool {
    ["level", "attribute", "atk", "def", "card_type", "property"]
        .iter()
        .any(|key| fields.get(key) == Some("???"))
}

/// Rush Duel set numbers carry the RD/ prefix. A Japanese printings list
/// where no set number starts with it marks a card filed under the wrong
/// game. Only the set-number segment counts; "RD/" elsewhere in a line
/// (a set name, a comment) is not a Rush printing.
fn not_a_rush_printing(fields: &PropertyMap) -> bool {
    match fields.get("jp_sets") {
        Some(sets) => !sets.split('\n').any(|line| {
            line.split(';')
                .next()
                .map(|number| number.trim().starts_with("RD/"))
                .unwrap_or(false)
        }),
        None => false,
    }
}

const OCG_TCG_SKIP_RULES: &[SkipRule] = &[
    SkipRule {
        reason: "no official database entry",
        matches: no_database_entry,
    },
    SkipRule {
        reason: "limitation text (non-catalog special card)",
        matches: limitation_text,
    },
    SkipRule {
        reason: "illegal card",
        matches: illegal_status,
    },
];

const RUSH_SKIP_RULES: &[SkipRule] = &[
    SkipRule {
        reason: "no official database entry",
        matches: no_database_entry_or_placeholder,
    },
    SkipRule {
        reason: "placeholder leak data",
        matches: placeholder_stats,
    },
    SkipRule {
        reason: "illegal card",
        matches: illegal_status,
    },
    SkipRule {
        reason: "misfiled non-Rush card",
        matches: not_a_rush_printing,
    },
];

pub fn skip_rules(kind: Kind) -> &'static [SkipRule] {
    match kind {
        Kind::OcgTcg => OCG_TCG_SKIP_RULES,
        Kind::Rush => RUSH_SKIP_RULES,
        Kind::Speed => &[],
    }
}

/// Compass directions on the card table, as printed glyphs.
const LINK_ARROW_GLYPHS: &[(&str, &str)] = &[
    ("Bottom-Left", "↙"),
    ("Bottom-Center", "⬇"),
    ("Bottom-Right", "↘"),
    ("Middle-Left", "⬅"),
    ("Middle-Right", "➡"),
    ("Top-Left", "↖"),
    ("Top-Center", "⬆"),
    ("Top-Right", "↗"),
];

/// Map the property map into a record, or None when a skip rule matches.
/// Errors mean a structural invariant was violated (a required card-table
/// argument is absent, an unknown link-arrow token); data-quality problems
/// only log.
pub fn transform(
    kind: Kind,
    fields: &PropertyMap,
    page_id: &PageId,
) -> anyhow::Result<Option<Record>> {
    for rule in skip_rules(kind) {
        if (rule.matches)(fields) {
            info!("skip page {} ({})", page_id, rule.reason);
            return Ok(None);
        }
    }
    let record = match kind {
        Kind::OcgTcg => Record::Card(Box::new(transform_card(fields, page_id)?)),
        Kind::Rush => Record::Card(Box::new(transform_rush(fields, page_id)?)),
        Kind::Speed => Record::Skill(Box::new(transform_skill(fields, page_id)?)),
    };
    Ok(Some(record))
}

fn transform_card(fields: &PropertyMap, page_id: &PageId) -> anyhow::Result<CardRecord> {
    let mut record = CardRecord::new(
        int_or_none(fields, "database_id"),
        int_or_none(fields, "password"),
        transform_names(fields),
        page_id.clone(),
    );
    record.text = Some(transform_texts(fields));
    annotate_shared(&mut record, fields)?;
    if let Some(image) = fields.get("image") {
        record.images = Some(transform_image(image));
    }
    record.sets = transform_sets(fields);
    record.limit_regulation = Some(LimitRegulation {
        tcg: owned(fields, "tcg_status"),
        ocg: owned(fields, "ocg_status"),
        speed: owned(fields, "tcg_speed_duel_status"),
    });
    record.is_translation_unofficial = fields.unofficial.clone();
    Ok(record)
}

fn transform_rush(fields: &PropertyMap, page_id: &PageId) -> anyhow::Result<CardRecord> {
    let mut record = CardRecord::new(
        int_or_none(fields, "database_id"),
        None,
        transform_names(fields),
        page_id.clone(),
    );
    if fields.contains("summoning_condition") {
        record.summoning_condition = Some(transform_multilanguage(fields, "summoning_condition"));
    }
    if fields.contains("requirement") {
        // Everything except Normal Monsters.
        record.requirement = Some(transform_multilanguage(fields, "requirement"));
        let effect_types = fields.get("effect_types").unwrap_or("");
        let texts = transform_texts(fields);
        if effect_types.contains("Continuous") {
            record.continuous_effect = Some(texts);
        } else if effect_types.contains("Multi-Choice") {
            record.multi_choice_effect = Some(texts);
        } else {
            record.effect = Some(texts);
        }
    } else {
        record.text = Some(transform_texts(fields));
    }
    annotate_shared(&mut record, fields)?;
    if fields.contains("materials") {
        // Localized map, replacing the single-line English bonus field.
        record.materials = Some(Materials::Localized(transform_multilanguage(
            fields,
            "materials",
        )));
    }
    if let Some(maximum_atk) = fields.get("maximum_atk") {
        record.maximum_atk = Some(NumOrString::parse(maximum_atk));
    }
    if fields.get("misc").is_some_and(|misc| misc.contains("Legend Card")) {
        record.legend = Some(true);
    }
    record.sets = transform_sets(fields);
    record.is_translation_unofficial = fields.unofficial.clone();
    Ok(record)
}

fn transform_skill(fields: &PropertyMap, page_id: &PageId) -> anyhow::Result<SkillRecord> {
    Ok(SkillRecord {
        name: transform_names(fields),
        type_line: owned(fields, "types"),
        activation: transform_multilanguage(fields, "skill_activation"),
        effect: transform_multilanguage(fields, "text"),
        character: owned(fields, "character"),
        image_front: owned(fields, "image"),
        image_back: owned(fields, "image2"),
        sets: transform_sets(fields),
        yugipedia_page_id: page_id.clone(),
    })
}

/// Fields shared by every card table: the monster/spell-trap branch and the
/// archetype list.
fn annotate_shared(record: &mut CardRecord, fields: &PropertyMap) -> anyhow::Result<()> {
    match fields.get("card_type") {
        // Some monsters carry an explicit card_type = Monster.
        Some(card_type) if card_type != "Monster" => {
            record.card_type = card_type.to_string();
            record.property = Some(required(fields, "property")?.to_string());
        }
        _ => {
            record.card_type = "Monster".to_string();
            record.monster_type_line = Some(required(fields, "types")?.to_string());
            let attribute = required(fields, "attribute")?;
            let upper = attribute.to_uppercase();
            if attribute != upper {
                warn!("attribute casing: {}", attribute);
            }
            record.attribute = Some(upper);
            if let Some(rank) = fields.get("rank") {
                record.rank = Some(parse_int(rank, "rank")?);
            } else if let Some(arrows) = fields.get("link_arrows") {
                record.link_arrows = Some(
                    arrows
                        .split(", ")
                        .map(link_arrow_glyph)
                        .collect::<anyhow::Result<Vec<String>>>()?,
                );
            } else {
                record.level = Some(parse_int(required(fields, "level")?, "level")?);
            }
            record.atk = Some(NumOrString::parse(required(fields, "atk")?));
            if let Some(def) = fields.get("def") {
                record.def = Some(NumOrString::parse(def));
            }
            if let Some(scale) = fields.get("pendulum_scale") {
                record.pendulum_scale = Some(parse_int(scale, "pendulum_scale")?);
                let mut pendulum = transform_multilanguage(fields, "pendulum_effect");
                if pendulum.zh_cn.is_none() {
                    pendulum.zh_cn = owned(fields, "ourocg_pendulum");
                }
                record.pendulum_effect = Some(pendulum);
            }
            // Bonus derived fields.
            if let Some(ritual) = fields.get("ritualcard") {
                record.ritual_spell = Some(ritual.to_string());
            }
            if let Some(materials) = fields.get("materials") {
                record.materials = Some(Materials::Line(materials.to_string()));
            }
        }
    }
    if let Some(archseries) = fields.get("archseries") {
        record.series = Some(
            archseries
                .split('\n')
                .map(|series| {
                    series
                        .trim_start_matches(['*', ' '])
                        .split('(')
                        .next()
                        .unwrap_or("")
                        .trim_end()
                        .to_string()
                })
                .collect(),
        );
    }
    Ok(())
}

fn link_arrow_glyph(direction: &str) -> anyhow::Result<String> {
    LINK_ARROW_GLYPHS
        .iter()
        .find(|(name, _)| *name == direction)
        .map(|(_, glyph)| glyph.to_string())
        .ok_or_else(|| anyhow!("unknown link arrow direction: {direction}"))
}

fn required<'a>(fields: &'a PropertyMap, key: &str) -> anyhow::Result<&'a str> {
    fields
        .get(key)
        .ok_or_else(|| anyhow!("card table missing required argument `{key}`"))
}

fn parse_int(value: &str, key: &str) -> anyhow::Result<i64> {
    match value.trim().parse() {
        Ok(number) => Ok(number),
        Err(_) => bail!("non-numeric `{key}`: {value}"),
    }
}

fn owned(fields: &PropertyMap, key: &str) -> Option<String> {
    fields.get(key).map(|value| value.to_string())
}

pub fn int_or_none(fields: &PropertyMap, key: &str) -> Option<i64> {
    fields.get(key).and_then(|value| value.trim().parse().ok())
}

fn transform_names(fields: &PropertyMap) -> NameMap {
    NameMap {
        en: fields.get("en_name").unwrap_or("").to_string(),
        de: owned(fields, "de_name"),
        es: owned(fields, "es_name"),
        fr: owned(fields, "fr_name"),
        it: owned(fields, "it_name"),
        pt: owned(fields, "pt_name"),
        ja: owned(fields, "ja_name"),
        ja_romaji: owned(fields, "romaji_name"),
        ko: owned(fields, "ko_name"),
        ko_rr: owned(fields, "ko_rr_name"),
        zh_tw: owned(fields, "tc_name"),
        // Secondary-region store fills the gap when the wiki has no name.
        zh_cn: owned(fields, "sc_name").or_else(|| owned(fields, "ourocg_name")),
    }
}

fn transform_texts(fields: &PropertyMap) -> TextMap {
    TextMap {
        en: owned(fields, "lore"),
        de: owned(fields, "de_lore"),
        es: owned(fields, "es_lore"),
        fr: owned(fields, "fr_lore"),
        it: owned(fields, "it_lore"),
        pt: owned(fields, "pt_lore"),
        ja: owned(fields, "ja_lore"),
        ko: owned(fields, "ko_lore"),
        zh_tw: owned(fields, "tc_lore"),
        zh_cn: owned(fields, "sc_lore").or_else(|| owned(fields, "ourocg_text")),
    }
}

fn transform_multilanguage(fields: &PropertyMap, base: &str) -> TextMap {
    TextMap {
        en: owned(fields, base),
        de: owned(fields, &format!("de_{base}")),
        es: owned(fields, &format!("es_{base}")),
        fr: owned(fields, &format!("fr_{base}")),
        it: owned(fields, &format!("it_{base}")),
        pt: owned(fields, &format!("pt_{base}")),
        ja: owned(fields, &format!("ja_{base}")),
        ko: owned(fields, &format!("ko_{base}")),
        zh_tw: owned(fields, &format!("tc_{base}")),
        zh_cn: owned(fields, &format!("sc_{base}")),
    }
}

/// Parse one printings field. Lines without a `"; "` separator are comment
/// sentinels for missing regional releases and are dropped. A missing third
/// segment is a known data-quality gap: rarities become null with a warning.
pub fn parse_sets(sets: &str) -> Vec<Printing> {
    let mut printings = Vec::new();
    for line in sets.split('\n') {
        if !line.contains("; ") {
            continue;
        }
        let segments: Vec<&str> = line.split(';').collect();
        let set_number = segments[0].trim().to_string();
        let set_name = segments.get(1).map(|s| s.trim()).unwrap_or("").to_string();
        let rarities = match segments.get(2).map(|s| s.trim()) {
            Some("") => None,
            Some(rarities) => Some(
                rarities
                    .split(", ")
                    .map(|rarity| rarity.to_string())
                    .collect(),
            ),
            None => {
                warn!("printing missing rarity segment: {}", line);
                None
            }
        };
        printings.push(Printing {
            set_number,
            set_name,
            rarities,
        });
    }
    printings
}

/// Fold the regional printings fields into the per-language sets map. The
/// four English-region fields concatenate into one list.
pub fn transform_sets(fields: &PropertyMap) -> SetsByLanguage {
    let mut sets = SetsByLanguage::default();
    let mut en = Vec::new();
    for key in ["en_sets", "na_sets", "eu_sets", "au_sets"] {
        if let Some(value) = fields.get(key) {
            en.extend(parse_sets(value));
        }
    }
    if !en.is_empty() {
        sets.en = Some(en);
    }
    sets.de = fields.get("de_sets").map(parse_sets);
    sets.es = fields.get("sp_sets").map(parse_sets);
    sets.fr = fields.get("fr_sets").map(parse_sets);
    sets.it = fields.get("it_sets").map(parse_sets);
    sets.pt = fields.get("pt_sets").map(parse_sets);
    sets.ja = fields.get("jp_sets").map(parse_sets);
    sets.ko = fields.get("kr_sets").map(parse_sets);
    sets.zh_tw = fields.get("tc_sets").map(parse_sets);
    sets.zh_cn = fields.get("sc_sets").map(parse_sets);
    sets
}

/// An image field is either a single bare filename (implicit index 1) or a
/// newline-delimited list of `index; filename[; illustrator]` entries.
pub fn transform_image(image: &str) -> Vec<CardImage> {
    if !image.contains('\n') && !image.contains("; ") {
        return vec![CardImage {
            index: NumOrString::Int(1),
            image: image.to_string(),
            illustration: None,
        }];
    }
    image
        .split('\n')
        .map(|line| {
            let entry: Vec<&str> = line.split("; ").collect();
            CardImage {
                index: NumOrString::parse(entry.first().unwrap_or(&"")),
                image: entry.get(1).map(|s| s.trim()).unwrap_or("").to_string(),
                illustration: entry.get(2).map(|s| s.trim().to_string()),
            }
        })
        .collect()
}
