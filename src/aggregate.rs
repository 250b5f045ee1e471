use crate::{
    config::Config,
    error::{AggregateError, ScanError, ScanErrorKind},
    report::{AggregateReport, FileEntry},
    scan::{FileCountRecord, MarkerSet, Markers, scan_file},
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// 0 picks the CPU count.
    pub max_workers: usize,
    pub markers: Markers,
}

impl EngineOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_workers: cfg.engine.max_workers,
            markers: Markers::from_config(cfg),
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

struct TaskResult {
    file_name: String,
    outcome: Result<FileCountRecord, ScanError>,
}

/// Scans every file of a directory on a fixed-size worker pool and merges
/// the per-file records into one report.
pub struct Aggregator {
    pool: rayon::ThreadPool,
    workers: usize,
    markers: Markers,
    compiled: Arc<MarkerSet>,
}

impl Aggregator {
    pub fn new(opts: &EngineOptions) -> Result<Self, AggregateError> {
        let workers = if opts.max_workers == 0 {
            num_cpus::get()
        } else {
            opts.max_workers
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("scan-{i}"))
            .panic_handler(|_| error!("scan worker panicked"))
            .build()?;
        Ok(Self {
            pool,
            workers,
            markers: opts.markers.clone(),
            compiled: Arc::new(MarkerSet::new(&opts.markers)),
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn aggregate(&self, dir: &Path) -> Result<AggregateReport, AggregateError> {
        self.aggregate_with(dir, |_| {})
    }

    /// Like [`Aggregator::aggregate`], calling `on_entry` with each file's
    /// entry as soon as it is collected.
    pub fn aggregate_with<F>(
        &self,
        dir: &Path,
        on_entry: F,
    ) -> Result<AggregateReport, AggregateError>
    where
        F: FnMut(&FileEntry),
    {
        self.aggregate_with_scanner(dir, scan_file, on_entry)
    }

    /// Same as [`Aggregator::aggregate_with`] with the per-file scan
    /// supplied by the caller. Each dispatched file still yields exactly one
    /// entry, even when `scanner` panics.
    pub fn aggregate_with_scanner<S, F>(
        &self,
        dir: &Path,
        scanner: S,
        mut on_entry: F,
    ) -> Result<AggregateReport, AggregateError>
    where
        S: Fn(&Path, &MarkerSet) -> Result<FileCountRecord, ScanError> + Send + Sync + 'static,
        F: FnMut(&FileEntry),
    {
        let started = Instant::now();
        let files = list_files(dir)?;
        let names: Vec<String> = files.iter().map(|(name, _)| name.clone()).collect();
        info!(
            "scanning {} files in {} with {} workers",
            files.len(),
            dir.display(),
            self.workers
        );

        let scanner = Arc::new(scanner);
        let (tx, rx) = mpsc::channel::<TaskResult>();
        for (file_name, path) in files {
            let tx = tx.clone();
            let markers = Arc::clone(&self.compiled);
            let scanner = Arc::clone(&scanner);
            self.pool.spawn(move || {
                let outcome = scanner(&path, &markers);
                // The receiver only goes away if the collector itself unwound.
                let _ = tx.send(TaskResult { file_name, outcome });
            });
        }
        drop(tx);

        let mut report = AggregateReport::new(dir, &self.markers, &names);
        let mut pending: HashSet<&str> = names.iter().map(String::as_str).collect();

        for _ in 0..names.len() {
            let Ok(result) = rx.recv() else {
                break;
            };
            pending.remove(result.file_name.as_str());
            let entry = FileEntry::from_outcome(result.file_name, result.outcome);
            log_entry(&entry);
            on_entry(&entry);
            report.push(entry);
        }

        if !pending.is_empty() {
            warn!("{} scan tasks exited without reporting", pending.len());
            let mut lost: Vec<&str> = pending.into_iter().collect();
            lost.sort_unstable();
            for name in lost {
                let entry = FileEntry::failed(
                    name.to_string(),
                    ScanErrorKind::Io,
                    "scan task exited without reporting",
                );
                log_entry(&entry);
                on_entry(&entry);
                report.push(entry);
            }
        }

        info!(
            "aggregated {} files ({} failed) in {:.1}ms",
            report.entries.len(),
            report.files_failed,
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(report)
    }
}

fn log_entry(entry: &FileEntry) {
    match &entry.failure {
        Some(f) => warn!(
            file = entry.file_name(),
            kind = %f.kind,
            "scan failed: {}",
            f.message
        ),
        None => debug!(
            file = entry.file_name(),
            counts = ?entry.record.counts,
            "scan done"
        ),
    }
}

/// Immediate entries of `dir`, sorted by name. Names that only differ in
/// non-UTF-8 bytes collapse under lossy conversion, so later ones get a
/// `#n` suffix to keep one report slot per file.
fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, AggregateError> {
    let unreadable = |source| AggregateError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        files.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut seen = HashSet::new();
    for (name, path) in &mut files {
        if seen.insert(name.clone()) {
            continue;
        }
        let base = name.clone();
        let mut n = 2;
        while !seen.insert(format!("{base}#{n}")) {
            n += 1;
        }
        *name = format!("{base}#{n}");
        warn!(
            "{} shares the name {} with another entry; reporting it as {}",
            path.display(),
            base,
            name
        );
    }
    Ok(files)
}
