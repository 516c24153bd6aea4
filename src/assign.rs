//! Synthetic password assignment for passwordless cards.
//!
//! Prerelease and promotional cards have no printed password, but downstream
//! joins still need a stable numeric key. The assignments file provides
//! either a direct per-page value or a per-set offset; in the latter case
//! the card's position within the set is read off its set number.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use anyhow::Context;
use log::warn;
use serde::Deserialize;

use crate::model::{CardRecord, FakePassword, Printing};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OffsetValue {
    One(i64),
    Many(Vec<i64>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AssignmentItem {
    Page {
        yugipedia: i64,
        fake_password: OffsetValue,
    },
    Set {
        set_abbreviation: String,
        fake_password_range: OffsetValue,
    },
}

#[derive(Debug, Default)]
pub struct Assignments {
    yugipedia: HashMap<i64, FakePassword>,
    set_abbreviation: HashMap<String, OffsetValue>,
}

impl OffsetValue {
    fn to_fake_password(&self, position: i64) -> FakePassword {
        match self {
            OffsetValue::One(offset) => FakePassword::One(position + offset),
            // Multi-region reissue set: one candidate per region.
            OffsetValue::Many(offsets) => {
                FakePassword::Many(offsets.iter().map(|offset| position + offset).collect())
            }
        }
    }

    fn direct(&self) -> FakePassword {
        match self {
            OffsetValue::One(value) => FakePassword::One(*value),
            OffsetValue::Many(values) => FakePassword::Many(values.clone()),
        }
    }
}

pub fn load_assignments(path: &Path) -> anyhow::Result<Assignments> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let items: Vec<AssignmentItem> = serde_yaml::from_reader(file)
        .with_context(|| format!("parsing assignments {}", path.display()))?;
    let mut assignments = Assignments::default();
    for item in items {
        match item {
            AssignmentItem::Page {
                yugipedia,
                fake_password,
            } => {
                assignments.yugipedia.insert(yugipedia, fake_password.direct());
            }
            AssignmentItem::Set {
                set_abbreviation,
                fake_password_range,
            } => {
                assignments
                    .set_abbreviation
                    .insert(set_abbreviation, fake_password_range);
            }
        }
    }
    Ok(assignments)
}

/// Position digits within a set number like "LOB-EN101". Region codes are
/// normally two letters, but a few carry a third letter before the digits.
fn position_digits(position: &str) -> Option<&str> {
    let third_is_digit = position
        .chars()
        .nth(2)
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false);
    let start = if third_is_digit { 2 } else { 3 };
    position.get(start..)
}

fn set_position(printing: &Printing) -> Option<(&str, &str)> {
    let (abbreviation, position) = printing.set_number.split_once('-')?;
    Some((abbreviation, position_digits(position)?))
}

pub fn annotate_assignments(record: &mut CardRecord, assignments: &Assignments) {
    // Direct per-page assignment short-circuits everything else.
    if let Some(page_id) = record.yugipedia_page_id.as_int() {
        if let Some(fake) = assignments.yugipedia.get(&page_id) {
            record.fake_password = Some(fake.clone());
            return;
        }
    }
    if record.password.is_some() {
        return;
    }
    let release = match record
        .sets
        .ja
        .as_deref()
        .and_then(<[Printing]>::first)
        .or_else(|| record.sets.en.as_deref().and_then(<[Printing]>::first))
    {
        Some(release) => release,
        None => return,
    };
    let (abbreviation, digits) = match set_position(release) {
        Some(parts) => parts,
        None => return,
    };
    let offsets = match assignments.set_abbreviation.get(abbreviation) {
        Some(offsets) => offsets,
        None => return,
    };
    match digits.parse::<i64>() {
        Ok(position) => record.fake_password = Some(offsets.to_fake_password(position)),
        Err(_) => warn!(
            "non-numeric set position in {:?} for {}",
            release.set_number, record.name.en
        ),
    }
}

#[cfg(test)]
mod assign_tests {
    use super::*;
    use crate::model::{NameMap, PageId};

    fn passwordless(set_number: &str) -> CardRecord {
        let mut record = CardRecord::new(None, None, NameMap::default(), PageId::Int(42));
        record.sets.en = Some(vec![Printing {
            set_number: set_number.to_string(),
            set_name: "Set One".to_string(),
            rarities: None,
        }]);
        record
    }

    fn with_offset(abbreviation: &str, offset: OffsetValue) -> Assignments {
        let mut assignments = Assignments::default();
        assignments
            .set_abbreviation
            .insert(abbreviation.to_string(), offset);
        assignments
    }

    #[test]
    fn offset_plus_position() {
        let mut record = passwordless("LOB-EN101");
        annotate_assignments(&mut record, &with_offset("LOB", OffsetValue::One(100)));
        assert_eq!(record.fake_password, Some(FakePassword::One(201)));
    }

    #[test]
    fn trailing_letter_region_code() {
        let mut record = passwordless("LOB-ENA01");
        annotate_assignments(&mut record, &with_offset("LOB", OffsetValue::One(100)));
        assert_eq!(record.fake_password, Some(FakePassword::One(101)));
    }

    #[test]
    fn multi_region_offsets_produce_candidates() {
        let mut record = passwordless("LOB-EN005");
        annotate_assignments(
            &mut record,
            &with_offset("LOB", OffsetValue::Many(vec![100, 900])),
        );
        assert_eq!(
            record.fake_password,
            Some(FakePassword::Many(vec![105, 905]))
        );
    }

    #[test]
    fn direct_page_assignment_short_circuits() {
        let mut record = passwordless("LOB-EN001");
        let mut assignments = with_offset("LOB", OffsetValue::One(100));
        assignments.yugipedia.insert(42, FakePassword::One(77777777));
        annotate_assignments(&mut record, &assignments);
        assert_eq!(record.fake_password, Some(FakePassword::One(77777777)));
    }

    #[test]
    fn cards_with_passwords_are_left_alone() {
        let mut record = passwordless("LOB-EN001");
        record.password = Some(89631139);
        annotate_assignments(&mut record, &with_offset("LOB", OffsetValue::One(100)));
        assert!(record.fake_password.is_none());
    }

    #[test]
    fn japanese_printing_takes_priority() {
        let mut record = passwordless("LOB-EN101");
        record.sets.ja = Some(vec![Printing {
            set_number: "LOB-JP003".to_string(),
            set_name: "Set One".to_string(),
            rarities: None,
        }]);
        annotate_assignments(&mut record, &with_offset("LOB", OffsetValue::One(100)));
        assert_eq!(record.fake_password, Some(FakePassword::One(103)));
    }

    #[test]
    fn non_numeric_position_is_not_fatal() {
        let mut record = passwordless("LOB-ENSE1");
        annotate_assignments(&mut record, &with_offset("LOB", OffsetValue::One(100)));
        assert!(record.fake_password.is_none());
    }
}
