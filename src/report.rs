use crate::{
    error::{ScanError, ScanErrorKind},
    scan::{Counts, FileCountRecord, Markers},
    util::{now_rfc3339, sha256_hex},
};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub kind: ScanErrorKind,
    pub message: String,
}

/// One slot per dispatched file. Failed slots keep zero counters and carry
/// the failure so they never read as "no matching lines".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(flatten)]
    pub record: FileCountRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ScanFailure>,
}

impl FileEntry {
    pub fn from_outcome(file_name: String, outcome: Result<FileCountRecord, ScanError>) -> Self {
        match outcome {
            Ok(record) => Self {
                record: FileCountRecord {
                    file_name,
                    counts: record.counts,
                },
                failure: None,
            },
            Err(err) => Self::failed(file_name, err.kind, err.source.to_string()),
        }
    }

    pub fn failed(file_name: String, kind: ScanErrorKind, message: impl Into<String>) -> Self {
        Self {
            record: FileCountRecord::empty(file_name),
            failure: Some(ScanFailure {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.record.file_name
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Compact single-line JSON: the file name, its six counters and the
    /// failure when there is one.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateReport {
    pub directory: String,
    pub batch_id: String,
    pub generated_at: String,
    /// Arrival order, not dispatch order.
    pub entries: Vec<FileEntry>,
    /// Sum over counted files only.
    pub totals: Counts,
    pub files_counted: usize,
    pub files_failed: usize,
}

impl AggregateReport {
    pub fn new(directory: &Path, markers: &Markers, file_names: &[String]) -> Self {
        Self {
            directory: directory.display().to_string(),
            batch_id: batch_id(markers, file_names),
            generated_at: now_rfc3339(),
            entries: Vec::with_capacity(file_names.len()),
            totals: Counts::default(),
            files_counted: 0,
            files_failed: 0,
        }
    }

    pub fn push(&mut self, entry: FileEntry) {
        if entry.is_failed() {
            self.files_failed += 1;
        } else {
            self.totals += &entry.record.counts;
            self.files_counted += 1;
        }
        self.entries.push(entry);
    }

    pub fn get(&self, file_name: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.file_name() == file_name)
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().filter(|e| e.is_failed())
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&render_entry(entry));
        }
        out.push_str(&render_summary(self));
        out
    }
}

/// Stable id for a file set scanned with a given marker set.
fn batch_id(markers: &Markers, file_names: &[String]) -> String {
    let mut names: Vec<&str> = file_names.iter().map(String::as_str).collect();
    names.sort_unstable();
    let seed = format!(
        "{}\n{}\n{}\n{}\n{}",
        markers.received,
        markers.redirect,
        markers.impression,
        markers.landing_page,
        names.join("\n")
    );
    sha256_hex(seed.as_bytes())
}

pub fn render_entry(entry: &FileEntry) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "file: {}", entry.file_name());
    match &entry.failure {
        Some(f) => {
            let _ = writeln!(out, " [FAILED] {}: {}", f.kind, f.message);
        }
        None => out.push_str(&render_counts(&entry.record.counts)),
    }
    out
}

fn render_counts(c: &Counts) -> String {
    format!(
        " [RCVD] Imp: {} LP: {} Total: {}\n [REDR] Imp: {} LP: {} Total: {}\n",
        c.received_impression,
        c.received_landing_page,
        c.received_total,
        c.redirect_impression,
        c.redirect_landing_page,
        c.redirect_total
    )
}

pub fn render_summary(report: &AggregateReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "totals ({} counted, {} failed):",
        report.files_counted, report.files_failed
    );
    out.push_str(&render_counts(&report.totals));
    if report.files_failed > 0 {
        let _ = writeln!(out, "failed files (excluded from totals):");
        for entry in report.failed() {
            let _ = writeln!(out, " - {}", entry.file_name());
        }
    }
    out
}
