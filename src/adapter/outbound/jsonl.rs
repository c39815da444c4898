//! JSON-lines record store: one `<collection>.jsonl` file per collection.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::Result;
use crate::port::{Collection, RecordStore};

pub struct JsonLinesStore {
    dir: PathBuf,
    // Serializes appends so concurrent records never interleave
    write_lock: Mutex<()>,
}

impl JsonLinesStore {
    /// Open (creating if needed) the store directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        info!(path = %dir.display(), "Record store opened");
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn file(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.jsonl", collection.as_str()))
    }
}

#[async_trait]
impl RecordStore for JsonLinesStore {
    async fn append(&self, collection: Collection, record: Value) -> Result<()> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file(collection))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn recent(&self, collection: Collection, limit: usize) -> Result<Vec<Value>> {
        let content = match fs::read_to_string(self.file(collection)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(limit);
        lines[start..]
            .iter()
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_append_and_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesStore::open(dir.path().join("records")).await.unwrap();

        for i in 0..5 {
            store
                .append(Collection::Orders, json!({ "seq": i }))
                .await
                .unwrap();
        }
        store
            .append(Collection::Balances, json!({ "asset": "BTC" }))
            .await
            .unwrap();

        let recent = store.recent(Collection::Orders, 2).await.unwrap();
        assert_eq!(recent, vec![json!({ "seq": 3 }), json!({ "seq": 4 })]);
        assert_eq!(store.recent(Collection::Balances, 10).await.unwrap().len(), 1);
        assert!(dir.path().join("records/orders.jsonl").exists());
    }

    #[tokio::test]
    async fn test_recent_on_missing_collection_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesStore::open(dir.path()).await.unwrap();
        assert!(store.recent(Collection::Events, 10).await.unwrap().is_empty());
    }
}
