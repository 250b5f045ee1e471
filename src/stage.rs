use crate::{
    config::Config,
    decompress::gunzip,
    error::FetchError,
    store::{ObjectStore, list_objects},
    util::{ensure_dir, remove_contents},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSummary {
    pub objects: usize,
    pub compressed_bytes: u64,
    pub decompressed_bytes: u64,
    pub log_dir: PathBuf,
}

/// Pulls one prefix worth of gzip logs out of the store and expands them
/// into the flat log directory the aggregator reads.
pub struct Stager<S: ObjectStore> {
    cfg: Config,
    store: S,
}

impl<S: ObjectStore> Stager<S> {
    pub fn new(cfg: &Config, store: S) -> Self {
        Self {
            cfg: cfg.clone(),
            store,
        }
    }

    pub fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        list_objects(&self.store, &self.cfg.store.bucket, prefix, self.cfg.store.page_size)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("listing {}/{}", self.cfg.store.bucket, prefix))
    }

    pub fn stage(&self, prefix: &str) -> Result<StageSummary> {
        let started = Instant::now();
        let bucket = self.cfg.store.bucket.as_str();
        let download_dir = PathBuf::from(&self.cfg.paths.download_dir);
        let log_dir = self.cfg.log_dir();

        remove_contents(&download_dir)?;
        ensure_dir(&log_dir)?;

        let mut summary = StageSummary {
            objects: 0,
            compressed_bytes: 0,
            decompressed_bytes: 0,
            log_dir: log_dir.clone(),
        };
        let mut extracted = HashSet::new();

        for key in list_objects(&self.store, bucket, prefix, self.cfg.store.page_size) {
            let key = key.with_context(|| format!("listing {bucket}/{prefix}"))?;
            if key.ends_with('/') {
                continue;
            }

            let local = local_path_for_key(&download_dir, &key, self.cfg.store.strip_components)?;
            info!("Downloading s3://{}/{} to {}...", bucket, key, local.display());
            summary.compressed_bytes += self
                .store
                .download(bucket, &key, &local)
                .with_context(|| format!("download {bucket}/{key}"))?;

            let name = extract_name_for_key(&key)?;
            if !extracted.insert(name.clone()) {
                warn!(
                    "{} expands to {} which an earlier object already wrote; overwriting",
                    key, name
                );
            }
            let target = log_dir.join(&name);
            summary.decompressed_bytes += gunzip(&local, &target)
                .with_context(|| format!("gunzip {}", local.display()))?;
            summary.objects += 1;
        }

        info!(
            "staged {} objects ({} -> {} bytes) in {:.1}s",
            summary.objects,
            summary.compressed_bytes,
            summary.decompressed_bytes,
            started.elapsed().as_secs_f64()
        );
        Ok(summary)
    }
}

/// `a/b/2016/11/01/x.gz` with `strip = 2` maps to `<dir>/2016/11/01/x.gz`.
pub fn local_path_for_key(dir: &Path, key: &str, strip: usize) -> Result<PathBuf, FetchError> {
    let rest: Vec<&str> = key
        .split('/')
        .filter(|s| !s.is_empty())
        .skip(strip)
        .collect();
    if rest.is_empty() || rest.iter().any(|s| *s == "..") {
        return Err(bad_key(key));
    }
    let mut path = dir.to_path_buf();
    path.extend(rest);
    Ok(path)
}

/// Last key segment up to its first `.`: `.../host-a.log.gz` -> `host-a`.
pub fn extract_name_for_key(key: &str) -> Result<String, FetchError> {
    let file_name = key.rsplit('/').next().unwrap_or_default();
    let stem = file_name.split('.').next().unwrap_or_default();
    if stem.is_empty() {
        return Err(bad_key(key));
    }
    Ok(stem.to_string())
}

fn bad_key(key: &str) -> FetchError {
    FetchError::io(
        format!("map key {key}"),
        io::Error::new(io::ErrorKind::InvalidInput, "key has no usable local file name"),
    )
}
