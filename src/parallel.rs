//! Bounded-queue worker pipeline over the page file list.
//!
//! A producer thread feeds file paths through a bounded channel to a fixed
//! set of workers sharing one receiver, so slow pages (huge printing lists,
//! deep template nesting) never stall a statically-assigned partition.
//! Results flow back tagged with their input index; the collector reorders
//! them with a streaming buffer so the aggregate output is deterministic
//! regardless of worker scheduling.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use indicatif::ProgressBar;
use log::error;

use crate::model::Record;
use crate::{process_page, Job, Stats};

#[derive(Debug, Clone)]
pub struct ParallelConfig {
    pub num_workers: usize,
    pub channel_buffer: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        let cpus = thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4);
        Self {
            num_workers: cpus,
            channel_buffer: 256,
        }
    }
}

/// What happened to one page. Failures are carried as values so a malformed
/// page costs one log line, never the rest of the batch.
pub enum PageOutcome {
    Skipped,
    Written { record: Option<Record> },
}

struct PageResult {
    index: usize,
    path: PathBuf,
    outcome: anyhow::Result<PageOutcome>,
}

pub fn run_pipeline(
    files: Vec<PathBuf>,
    job: Arc<Job>,
    config: &ParallelConfig,
    progress: ProgressBar,
) -> (Stats, Vec<Record>) {
    let start_time = Instant::now();
    let total = files.len();

    let (path_tx, path_rx): (SyncSender<(usize, PathBuf)>, Receiver<(usize, PathBuf)>) =
        sync_channel(config.channel_buffer);
    let (result_tx, result_rx): (SyncSender<PageResult>, Receiver<PageResult>) =
        sync_channel(config.channel_buffer);

    let producer = thread::spawn(move || {
        for (index, path) in files.into_iter().enumerate() {
            if path_tx.send((index, path)).is_err() {
                break;
            }
        }
    });

    let path_rx = Arc::new(Mutex::new(path_rx));
    let workers: Vec<JoinHandle<()>> = (0..config.num_workers.max(1))
        .map(|_| {
            let rx = Arc::clone(&path_rx);
            let tx = result_tx.clone();
            let job = Arc::clone(&job);
            thread::spawn(move || process_worker(rx, tx, &job))
        })
        .collect();
    // Workers hold the only remaining senders; the collector loop ends when
    // the last one finishes.
    drop(result_tx);

    let (stats, records) = collect_results(result_rx, total, &progress, start_time);

    producer.join().ok();
    for worker in workers {
        worker.join().ok();
    }
    progress.finish_and_clear();
    (stats, records)
}

fn process_worker(
    rx: Arc<Mutex<Receiver<(usize, PathBuf)>>>,
    tx: SyncSender<PageResult>,
    job: &Job,
) {
    loop {
        let item = {
            let lock = rx.lock().ok();
            lock.and_then(|guard| guard.recv().ok())
        };
        match item {
            Some((index, path)) => {
                let outcome = process_page(&path, job);
                if tx.send(PageResult {
                    index,
                    path,
                    outcome,
                }).is_err()
                {
                    break;
                }
            }
            None => break,
        }
    }
}

/// Gather worker results, reordering by input index with a streaming buffer
/// so the collected record list is stable across runs.
fn collect_results(
    rx: Receiver<PageResult>,
    total: usize,
    progress: &ProgressBar,
    start_time: Instant,
) -> (Stats, Vec<Record>) {
    let mut stats = Stats::default();
    let mut records = Vec::new();
    let mut pending: BTreeMap<usize, PageResult> = BTreeMap::new();
    let mut next_expected = 0usize;

    let take = |result: PageResult, stats: &mut Stats, records: &mut Vec<Record>| {
        stats.pages_processed += 1;
        match result.outcome {
            Ok(PageOutcome::Skipped) => stats.skipped += 1,
            Ok(PageOutcome::Written { record }) => {
                stats.records_written += 1;
                if let Some(record) = record {
                    records.push(record);
                }
            }
            Err(err) => {
                stats.failed += 1;
                error!("{}: {:#}", result.path.display(), err);
            }
        }
    };

    for result in rx {
        progress.inc(1);
        if result.index == next_expected {
            take(result, &mut stats, &mut records);
            next_expected += 1;
            while let Some(buffered) = pending.remove(&next_expected) {
                take(buffered, &mut stats, &mut records);
                next_expected += 1;
            }
        } else {
            pending.insert(result.index, result);
        }
    }
    // Left over only if some indices never arrived.
    for (_, result) in std::mem::take(&mut pending) {
        take(result, &mut stats, &mut records);
    }

    debug_assert!(stats.pages_processed <= total);
    stats.elapsed = start_time.elapsed();
    (stats, records)
}
