use crate::{config::Config, error::ScanError};
use memchr::memmem::Finder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::AddAssign;
use std::path::Path;

/// The four literals a line is searched for. Case-sensitive, exact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Markers {
    pub received: String,
    pub redirect: String,
    pub impression: String,
    pub landing_page: String,
}

impl Markers {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            received: cfg.scan.received_marker.clone(),
            redirect: cfg.scan.redirect_marker.clone(),
            impression: cfg.scan.impression_marker.clone(),
            landing_page: cfg.scan.landing_page_marker.clone(),
        }
    }
}

impl Default for Markers {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Markers compiled into substring finders, shared read-only across scans.
#[derive(Debug, Clone)]
pub struct MarkerSet {
    received: Finder<'static>,
    redirect: Finder<'static>,
    impression: Finder<'static>,
    landing_page: Finder<'static>,
}

impl MarkerSet {
    pub fn new(markers: &Markers) -> Self {
        let compile = |s: &str| Finder::new(s.as_bytes()).into_owned();
        Self {
            received: compile(&markers.received),
            redirect: compile(&markers.redirect),
            impression: compile(&markers.impression),
            landing_page: compile(&markers.landing_page),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub received_total: u64,
    pub received_impression: u64,
    pub received_landing_page: u64,
    pub redirect_total: u64,
    pub redirect_impression: u64,
    pub redirect_landing_page: u64,
}

impl Counts {
    pub fn is_zero(&self) -> bool {
        *self == Counts::default()
    }

    fn tally_line(&mut self, line: &[u8], m: &MarkerSet) {
        let sub_type = |line: &[u8]| {
            if m.impression.find(line).is_some() {
                SubType::Impression
            } else if m.landing_page.find(line).is_some() {
                SubType::LandingPage
            } else {
                SubType::Other
            }
        };

        if m.received.find(line).is_some() {
            self.received_total += 1;
            match sub_type(line) {
                SubType::Impression => self.received_impression += 1,
                SubType::LandingPage => self.received_landing_page += 1,
                SubType::Other => {}
            }
        }
        if m.redirect.find(line).is_some() {
            self.redirect_total += 1;
            match sub_type(line) {
                SubType::Impression => self.redirect_impression += 1,
                SubType::LandingPage => self.redirect_landing_page += 1,
                SubType::Other => {}
            }
        }
    }
}

impl AddAssign<&Counts> for Counts {
    fn add_assign(&mut self, rhs: &Counts) {
        self.received_total += rhs.received_total;
        self.received_impression += rhs.received_impression;
        self.received_landing_page += rhs.received_landing_page;
        self.redirect_total += rhs.redirect_total;
        self.redirect_impression += rhs.redirect_impression;
        self.redirect_landing_page += rhs.redirect_landing_page;
    }
}

enum SubType {
    Impression,
    LandingPage,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCountRecord {
    pub file_name: String,
    #[serde(flatten)]
    pub counts: Counts,
}

impl FileCountRecord {
    pub fn empty(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            counts: Counts::default(),
        }
    }
}

/// Scans one file. The record is keyed by the file's name, not its full path.
pub fn scan_file(path: &Path, markers: &MarkerSet) -> Result<FileCountRecord, ScanError> {
    let file = File::open(path).map_err(|e| ScanError::open(path, e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    scan_reader(name, BufReader::new(file), markers).map_err(|e| ScanError::read(path, e))
}

/// Line-by-line scan of any buffered reader. Lines are raw bytes split on
/// `\n`; an unterminated last line still counts.
pub fn scan_reader<R: BufRead>(
    file_name: impl Into<String>,
    mut reader: R,
    markers: &MarkerSet,
) -> std::io::Result<FileCountRecord> {
    let mut record = FileCountRecord::empty(file_name);
    let mut line = Vec::with_capacity(4096);
    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        let mut body = line.as_slice();
        if let Some(rest) = body.strip_suffix(b"\n") {
            body = rest;
        }
        if let Some(rest) = body.strip_suffix(b"\r") {
            body = rest;
        }
        record.counts.tally_line(body, markers);
    }
    Ok(record)
}
