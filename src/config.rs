use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub store: Store,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub scan: Scan,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("scan.received_marker", &self.scan.received_marker),
            ("scan.redirect_marker", &self.scan.redirect_marker),
            ("scan.impression_marker", &self.scan.impression_marker),
            ("scan.landing_page_marker", &self.scan.landing_page_marker),
        ] {
            if value.is_empty() {
                bail!("{name} must not be empty");
            }
        }
        match self.output.format.as_str() {
            "text" | "json" => {}
            other => bail!("unknown output.format: {other}"),
        }
        if self.store.page_size == 0 {
            bail!("store.page_size must be greater than 0");
        }
        Ok(())
    }

    /// `<download_dir>/<extract_dir>`, where the scanner reads from.
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.download_dir).join(&self.paths.extract_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub job_name: String,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            job_name: "tppa-daily".into(),
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    /// Directory holding one subdirectory per bucket.
    pub root: String,
    pub bucket: String,
    pub prefix: String,
    pub page_size: usize,
    /// Leading key segments dropped when mirroring a key locally.
    pub strip_components: usize,
}
impl Default for Store {
    fn default() -> Self {
        Self {
            root: ".".into(),
            bucket: "p-jp-logs".into(),
            prefix: "P-JP-EMGR/mod/2016/11/01/".into(),
            page_size: 1000,
            strip_components: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub download_dir: String,
    pub extract_dir: String,
    pub out_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            download_dir: "s3logs".into(),
            extract_dir: "logs".into(),
            out_dir: "out".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub received_marker: String,
    pub redirect_marker: String,
    pub impression_marker: String,
    pub landing_page_marker: String,
}
impl Default for Scan {
    fn default() -> Self {
        Self {
            received_marker: "tppa_pxl_rcvd".into(),
            redirect_marker: "tppa_redirect_pxl".into(),
            impression_marker: "evt=1".into(),
            landing_page_marker: "evt=5".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Engine {
    /// Worker threads for scanning. 0 picks the CPU count.
    pub max_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub format: String,
    pub write_report_json: bool,
    pub report_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            format: "text".into(),
            write_report_json: false,
            report_filename: "report.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
