//! Scans a directory of scraped wiki card pages and emits one canonical
//! YAML + JSON record per card, merging in the optional secondary sources
//! (Korean database tables, the zh-CN translation store, the Master Duel
//! aggregate, limit-regulation vectors, fake-password assignments).

mod assign;
mod extract;
mod markup;
mod merge;
mod model;
mod output;
mod parallel;
mod transform;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use crate::assign::Assignments;
use crate::merge::MergeSources;
use crate::model::{PageId, Record};
use crate::parallel::{PageOutcome, ParallelConfig};
use crate::transform::Kind;

#[derive(Parser, Debug)]
#[command(version, about = "Convert scraped wiki card pages into canonical records")]
struct Args {
    /// Entity kind to process
    #[arg(value_enum)]
    kind: Kind,

    /// Directory of per-page YAML documents ({title, wikitext})
    wikitext_directory: PathBuf,

    /// Directory to write per-card YAML/JSON records into
    #[arg(long, default_value = ".")]
    output: PathBuf,

    /// Secondary-region translation store, one YAML file per password
    #[arg(long = "zh-cn")]
    zh_cn: Option<PathBuf>,

    /// Fake password assignment YAML
    #[arg(long)]
    assignments: Option<PathBuf>,

    /// TCG Forbidden & Limited List, Konami ID vector JSON
    #[arg(long)]
    tcg: Option<PathBuf>,

    /// OCG Forbidden & Limited List, English name vector JSON
    #[arg(long)]
    ocg: Option<PathBuf>,

    /// Unreleased-card status table JSON
    #[arg(long)]
    unreleased: Option<PathBuf>,

    /// Official Korean database CSV
    #[arg(long = "ko-official")]
    ko_official: Option<PathBuf>,

    /// Manual Korean override TSV, always wins
    #[arg(long = "ko-override")]
    ko_override: Option<PathBuf>,

    /// Korean prerelease CSV keyed by page id
    #[arg(long = "ko-prerelease")]
    ko_prerelease: Option<PathBuf>,

    /// Master Duel aggregate JSON
    #[arg(long = "master-duel")]
    master_duel: Option<PathBuf>,

    /// Output aggregate JSON file
    #[arg(long)]
    aggregate: Option<PathBuf>,

    /// Number of worker threads, 0 = number of CPUs
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Suppress the progress bar
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Default)]
pub struct Stats {
    pub pages_processed: usize,
    pub records_written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl Stats {
    fn print(&self) {
        eprintln!("Pages processed: {}", self.pages_processed);
        eprintln!("Records written: {}", self.records_written);
        eprintln!("Skipped:         {}", self.skipped);
        eprintln!("Failed:          {}", self.failed);
        eprintln!("Elapsed:         {:.2?}", self.elapsed);
    }
}

/// Everything a worker needs for one run, loaded once and shared read-only.
pub struct Job {
    pub kind: Kind,
    pub output_dir: PathBuf,
    pub sources: MergeSources,
    pub assignments: Option<Assignments>,
    /// Keep finished records in memory for the aggregate file.
    pub collect: bool,
}

/// The per-page pipeline: load, parse, extract, transform, merge, write.
/// Errors propagate to the caller, which logs and moves on; a malformed
/// page never takes down the batch.
pub fn process_page(path: &Path, job: &Job) -> anyhow::Result<PageOutcome> {
    let page = extract::load_page(path)?;
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("");
    let page_id = PageId::from_stem(stem);

    let parsed = markup::parse(&page.wikitext);
    let mut fields = match extract::extract_fields(&parsed, &page.title, extract::CARD_TABLE) {
        Some(fields) => fields,
        None => {
            info!("skip page {} (no card table)", page_id);
            return Ok(PageOutcome::Skipped);
        }
    };

    if job.kind == Kind::OcgTcg {
        if let Some(zh_cn_dir) = &job.sources.zh_cn_dir {
            merge::annotate_zh_cn(zh_cn_dir, &mut fields)?;
        }
    }

    let mut record = match transform::transform(job.kind, &fields, &page_id)? {
        Some(record) => record,
        None => return Ok(PageOutcome::Skipped),
    };

    if let Record::Card(card) = &mut record {
        merge::apply(job.kind, card, &job.sources);
        if job.kind == Kind::OcgTcg {
            if let Some(assignments) = &job.assignments {
                assign::annotate_assignments(card, assignments);
            }
        }
    }

    output::write_record(&job.output_dir, &record)?;
    Ok(PageOutcome::Written {
        record: job.collect.then_some(record),
    })
}

fn load_sources(args: &Args) -> anyhow::Result<MergeSources> {
    let mut sources = MergeSources {
        zh_cn_dir: args.zh_cn.clone(),
        ..MergeSources::default()
    };
    if let Some(path) = &args.ko_official {
        sources.ko_official = Some(merge::load_ko_table(path, "konami_id", b',')?);
    }
    if let Some(path) = &args.ko_override {
        sources.ko_override = Some(merge::load_ko_table(path, "konami_id", b'\t')?);
    }
    if let Some(path) = &args.ko_prerelease {
        sources.ko_prerelease = Some(merge::load_ko_table(path, "yugipedia_page_id", b',')?);
    }
    if let Some(path) = &args.master_duel {
        sources.master_duel = Some(merge::load_master_duel(path)?);
    }
    if let Some(path) = &args.tcg {
        sources.tcg_vector = Some(merge::load_vector(path)?);
    }
    if let Some(path) = &args.ocg {
        sources.ocg_vector = Some(merge::load_vector(path)?);
    }
    if let Some(path) = &args.unreleased {
        sources.unreleased = Some(merge::load_unreleased(path)?);
    }
    Ok(sources)
}

fn list_pages(directory: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(directory)
        .with_context(|| format!("reading {}", directory.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    // Deterministic input order keeps the aggregate stable across runs.
    files.sort();
    Ok(files)
}

fn run_sequential(files: Vec<PathBuf>, job: &Job, progress: ProgressBar) -> (Stats, Vec<Record>) {
    let start_time = Instant::now();
    let mut stats = Stats::default();
    let mut records = Vec::new();
    for path in files {
        stats.pages_processed += 1;
        match process_page(&path, job) {
            Ok(PageOutcome::Skipped) => stats.skipped += 1,
            Ok(PageOutcome::Written { record }) => {
                stats.records_written += 1;
                if let Some(record) = record {
                    records.push(record);
                }
            }
            Err(err) => {
                stats.failed += 1;
                log::error!("{}: {:#}", path.display(), err);
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();
    stats.elapsed = start_time.elapsed();
    (stats, records)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let sources = load_sources(&args)?;
    let assignments = match &args.assignments {
        Some(path) => Some(assign::load_assignments(path)?),
        None => None,
    };
    let files = list_pages(&args.wikitext_directory)?;
    info!("{} pages in {}", files.len(), args.wikitext_directory.display());

    fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let job = Job {
        kind: args.kind,
        output_dir: args.output.clone(),
        sources,
        assignments,
        collect: args.aggregate.is_some(),
    };

    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(files.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let mut config = ParallelConfig::default();
    if args.threads > 0 {
        config.num_workers = args.threads;
    }

    let (stats, records) = if config.num_workers == 1 {
        run_sequential(files, &job, progress)
    } else {
        parallel::run_pipeline(files, Arc::new(job), &config, progress)
    };

    if let Some(aggregate) = &args.aggregate {
        output::write_aggregate(aggregate, &records)?;
    }

    stats.print();
    Ok(())
}
