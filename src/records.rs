use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tokio::fs;

use crate::formats::DocumentRecord;

/// The todo/done list of documents, backed by a JSON array on disk.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    records: Vec<DocumentRecord>,
}

impl RecordStore {
    /// Reads the state file, creating an empty one when it does not exist yet.
    pub async fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let records = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parse state file: {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                write_json_atomic(&path, &Vec::<DocumentRecord>::new())
                    .await
                    .context("create empty state file")?;
                Vec::new()
            }
            Err(err) => {
                return Err(err).with_context(|| format!("read state file: {}", path.display()));
            }
        };

        Ok(Self { path, records })
    }

    pub fn records(&self) -> &[DocumentRecord] {
        &self.records
    }

    pub fn contains_search_keys(&self, search_keys: &str) -> bool {
        self.records
            .iter()
            .any(|record| record.search_keys == search_keys)
    }

    /// Appends records whose URL is not present yet. Returns how many were added.
    pub fn merge(&mut self, candidates: impl IntoIterator<Item = DocumentRecord>) -> usize {
        let mut seen: HashSet<String> = self.records.iter().map(|r| r.url.clone()).collect();
        let mut added = 0_usize;
        for candidate in candidates {
            if !seen.insert(candidate.url.clone()) {
                continue;
            }
            self.records.push(candidate);
            added += 1;
        }
        added
    }

    /// URLs of records that still need to be captured, in file order.
    pub fn pending_urls(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|record| !record.open)
            .map(|record| record.url.clone())
            .collect()
    }

    pub fn get(&self, url: &str) -> Option<&DocumentRecord> {
        self.records.iter().find(|record| record.url == url)
    }

    pub fn mark_open(&mut self, url: &str) -> anyhow::Result<()> {
        let record = self
            .records
            .iter_mut()
            .find(|record| record.url == url)
            .ok_or_else(|| anyhow::anyhow!("no record for url: {url}"))?;
        if record.open {
            anyhow::bail!("record is already open: {url}");
        }
        record.open = true;
        Ok(())
    }

    pub async fn save(&self) -> anyhow::Result<()> {
        write_json_atomic(&self.path, &self.records)
            .await
            .with_context(|| format!("write state file: {}", self.path.display()))
    }
}

pub(crate) async fn write_json_atomic<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create parent dir: {}", parent.display()))?;
    }

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
