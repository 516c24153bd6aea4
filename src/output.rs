//! Record identity and emission.
//!
//! The basename doubles as the record's primary key for downstream joins,
//! so its derivation order is load-bearing: a printed password beats the
//! Konami database id, which beats the wiki page id. Each record is written
//! twice, as editable YAML and as compact JSON.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Context;
use log::info;

use crate::model::{CardRecord, Record, SkillRecord};

pub fn card_basename(record: &CardRecord) -> String {
    if let Some(password) = record.password {
        // Recreate the eight-digit password with leading zeros.
        format!("{:08}", password)
    } else if let Some(konami_id) = record.konami_id {
        format!("kdb{}", konami_id)
    } else {
        format!("yugipedia{}", record.yugipedia_page_id)
    }
}

pub fn skill_basename(record: &SkillRecord) -> String {
    format!("yugipedia{}", record.yugipedia_page_id)
}

pub fn basename(record: &Record) -> String {
    match record {
        Record::Card(card) => card_basename(card),
        Record::Skill(skill) => skill_basename(skill),
    }
}

pub fn write_record(directory: &Path, record: &Record) -> anyhow::Result<String> {
    let basename = basename(record);
    let yaml_path = directory.join(format!("{}.yaml", basename));
    info!("write: {}", yaml_path.display());
    let yaml_file = File::create(&yaml_path)
        .with_context(|| format!("creating {}", yaml_path.display()))?;
    serde_yaml::to_writer(BufWriter::new(yaml_file), record)
        .with_context(|| format!("writing {}", yaml_path.display()))?;

    let json_path = directory.join(format!("{}.json", basename));
    info!("write: {}", json_path.display());
    let json_file = File::create(&json_path)
        .with_context(|| format!("creating {}", json_path.display()))?;
    serde_json::to_writer(BufWriter::new(json_file), record)
        .with_context(|| format!("writing {}", json_path.display()))?;
    Ok(basename)
}

/// One JSON array of every record from the run, written only on request.
pub fn write_aggregate(path: &Path, records: &[Record]) -> anyhow::Result<()> {
    info!("write: {}", path.display());
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), records)
        .with_context(|| format!("writing aggregate {}", path.display()))
}

#[cfg(test)]
mod output_tests {
    use super::*;
    use crate::model::{NameMap, PageId};

    fn record(password: Option<i64>, konami_id: Option<i64>) -> CardRecord {
        CardRecord::new(konami_id, password, NameMap::default(), PageId::Int(42))
    }

    #[test]
    fn password_pads_to_eight_digits() {
        assert_eq!(card_basename(&record(Some(12345678), Some(999))), "12345678");
        assert_eq!(card_basename(&record(Some(33396948), None)), "33396948");
        assert_eq!(card_basename(&record(Some(7902349), None)), "07902349");
    }

    #[test]
    fn konami_id_fallback() {
        assert_eq!(card_basename(&record(None, Some(999))), "kdb999");
    }

    #[test]
    fn page_id_fallback_of_last_resort() {
        assert_eq!(card_basename(&record(None, None)), "yugipedia42");
    }
}
