use super::{ObjectPage, ObjectStore};
use crate::error::FetchError;
use std::fs::File;
use std::io;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;
use walkdir::WalkDir;

/// An object store laid out on disk: each bucket is a directory under
/// `root`, each key a `/`-separated path inside it.
///
/// A listing is walked once when it starts (no continuation) and later
/// pages are served from that snapshot.
pub struct LocalObjectStore {
    root: PathBuf,
    listings: Mutex<HashMap<(String, String), Arc<Vec<String>>>>,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            listings: Mutex::new(HashMap::new()),
        }
    }

    fn listing(
        &self,
        bucket: &str,
        prefix: &str,
        fresh: bool,
    ) -> Result<Arc<Vec<String>>, FetchError> {
        let id = (bucket.to_string(), prefix.to_string());
        if !fresh {
            let cached = self
                .listings
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&id)
                .cloned();
            if let Some(keys) = cached {
                return Ok(keys);
            }
        }
        let keys = Arc::new(self.all_keys(bucket, prefix)?);
        self.listings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::clone(&keys));
        Ok(keys)
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut p = self.bucket_dir(bucket);
        p.extend(key.split('/').filter(|s| !s.is_empty()));
        p
    }

    fn all_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, FetchError> {
        let dir = self.bucket_dir(bucket);
        if !dir.is_dir() {
            return Err(FetchError::NotFound {
                bucket: bucket.to_string(),
                key: prefix.to_string(),
            });
        }
        // Only the prefix's directory part can hold matching keys.
        let mut walk_root = dir.clone();
        if let Some((prefix_dir, _)) = prefix.rsplit_once('/') {
            walk_root.extend(prefix_dir.split('/').filter(|s| !s.is_empty()));
        }
        let mut keys = Vec::new();
        if !walk_root.is_dir() {
            return Ok(keys);
        }
        for entry in WalkDir::new(&walk_root).min_depth(1) {
            let entry = entry.map_err(|e| {
                FetchError::io(format!("walk {}", dir.display()), io::Error::other(e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&dir) else {
                continue;
            };
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl ObjectStore for LocalObjectStore {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage, FetchError> {
        let keys = self.listing(bucket, prefix, continuation.is_none())?;
        let start = match continuation {
            Some(after) => keys.partition_point(|k| k.as_str() <= after),
            None => 0,
        };
        let end = (start + max_keys.max(1)).min(keys.len());
        let page: Vec<String> = keys[start..end].to_vec();
        let next_continuation = if end < keys.len() {
            page.last().cloned()
        } else {
            None
        };
        Ok(ObjectPage {
            keys: page,
            next_continuation,
        })
    }

    fn download(&self, bucket: &str, key: &str, local_path: &Path) -> Result<u64, FetchError> {
        let src = self.object_path(bucket, key);
        let mut reader = File::open(&src).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FetchError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            _ => FetchError::io(format!("open {}", src.display()), e),
        })?;

        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| FetchError::io(format!("create_dir_all {}", parent.display()), e))?;
        }
        let mut writer = File::create(local_path)
            .map_err(|e| FetchError::io(format!("create {}", local_path.display()), e))?;
        let n = io::copy(&mut reader, &mut writer)
            .map_err(|e| FetchError::io(format!("copy {}/{}", bucket, key), e))?;
        debug!("copied {} bytes from {} to {}", n, src.display(), local_path.display());
        Ok(n)
    }
}
