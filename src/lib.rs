pub mod aggregate;
pub mod cli;
pub mod config;
pub mod decompress;
pub mod error;
pub mod report;
pub mod scan;
pub mod stage;
pub mod store;
pub mod util;

pub use aggregate::{Aggregator, EngineOptions};
pub use report::{AggregateReport, FileEntry};
pub use scan::{Counts, FileCountRecord, MarkerSet, Markers, scan_file};
