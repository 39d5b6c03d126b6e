use crate::config::StorageConfig;
use crate::errors::{Result, StoreError};
use crate::listing::{ListPage, ObjectLister};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

/// Local-directory object store. Keys are `/`-separated paths relative to the
/// lake root.
pub struct Lake {
    config: StorageConfig,
    page_size: usize,
}

impl Lake {
    pub async fn new(config: StorageConfig, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(StoreError::Config("lake page size must be > 0".into()));
        }
        // Ensure the base directory exists
        tokio::fs::create_dir_all(&config.lake_path).await?;
        Ok(Self { config, page_size })
    }

    pub fn root(&self) -> &Path {
        &self.config.lake_path
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || key.starts_with('/')
            || key.split('/').any(|part| part == ".." || part == "." || part.is_empty())
        {
            return Err(StoreError::InvalidArg(format!("invalid object key '{key}'")));
        }
        Ok(self.config.lake_path.join(key))
    }

    pub async fn object_exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(key)?).await?)
    }

    pub async fn read_object(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("object '{key}'")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes an object, replacing any previous content under the same key.
    pub async fn write_object(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let full_path = self.resolve(key)?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a sibling temp file first so readers never see a torn object.
        let tmp_path = temp_sibling(&full_path);
        let written = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp_path, &full_path).await
        }
        .await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn write_json<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_object(key, &bytes).await
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique per writer, so concurrent writes of one key never share a temp file.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}.{n}.partial", std::process::id()))
}

/// Depth-first walk in key order that stops once `limit` keys after
/// `continuation` have been collected.
fn walk_sorted(
    dir: &Path,
    rel: &str,
    prefix: &str,
    continuation: Option<&str>,
    limit: usize,
    out: &mut Vec<String>,
) -> std::io::Result<()> {
    let mut entries: Vec<(String, bool)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".partial") {
            continue;
        }
        entries.push((name, entry.file_type()?.is_dir()));
    }
    // A directory "a" sorts as "a/" when compared with sibling keys.
    entries.sort_by(|(a, a_dir), (b, b_dir)| {
        let a = if *a_dir { format!("{a}/") } else { a.clone() };
        let b = if *b_dir { format!("{b}/") } else { b.clone() };
        a.cmp(&b)
    });

    for (name, is_dir) in entries {
        if out.len() >= limit {
            break;
        }
        let key = if rel.is_empty() {
            name.clone()
        } else {
            format!("{rel}/{name}")
        };
        if is_dir {
            let dir_key = format!("{key}/");
            // Skip subtrees that cannot contain keys under the prefix or after the token.
            let overlaps_prefix = dir_key.starts_with(prefix) || prefix.starts_with(&dir_key);
            let beyond_token = continuation.is_none_or(|token| {
                dir_key.as_str() > token || token.starts_with(&dir_key)
            });
            if overlaps_prefix && beyond_token {
                walk_sorted(&dir.join(&name), &key, prefix, continuation, limit, out)?;
            }
        } else if key.starts_with(prefix) && continuation.is_none_or(|token| key.as_str() > token)
        {
            out.push(key);
        }
    }
    Ok(())
}

#[async_trait]
impl ObjectLister for Lake {
    async fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        let root = self.config.lake_path.clone();
        let prefix = prefix.to_string();
        let continuation = continuation.map(str::to_string);
        let limit = self.page_size + 1;

        let mut keys = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let mut out = Vec::new();
            walk_sorted(&root, "", &prefix, continuation.as_deref(), limit, &mut out)?;
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::Other(anyhow::anyhow!("lake listing task failed: {e}")))??;

        let next_continuation = if keys.len() > self.page_size {
            keys.truncate(self.page_size);
            keys.last().cloned()
        } else {
            None
        };
        log::debug!("Listed {} key(s) from lake page", keys.len());
        Ok(ListPage {
            keys,
            next_continuation,
        })
    }
}
