//! Durable, token-keyed progress records for long-running runs.
//!
//! Each run writes `<dir>/<token>.json`. Writes go to a temporary file that
//! is renamed over the record, so a reader sees either the old or the new
//! record, never half of one.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::ProgressError;
use crate::models::{ProgressEvent, ProgressRecord};

const MAX_TOKEN_LEN: usize = 128;

/// A fresh, URL-safe run token.
pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[derive(Debug, Clone)]
pub struct ProgressStore {
    dir: PathBuf,
}

impl ProgressStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, token: &str) -> Result<PathBuf, ProgressError> {
        if !is_valid_token(token) {
            return Err(ProgressError::InvalidToken(token.to_string()));
        }
        Ok(self.dir.join(format!("{token}.json")))
    }

    pub async fn write(&self, token: &str, record: &ProgressRecord) -> Result<(), ProgressError> {
        let path = self.path(token)?;
        let body = serde_json::to_vec(record)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Missing or unreadable records read as the zero record.
    pub async fn read(&self, token: &str) -> Result<ProgressRecord, ProgressError> {
        let path = self.path(token)?;
        let record = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                debug!("unparsable progress record {}: {err}", path.display());
                ProgressRecord::default()
            }),
            Err(_) => ProgressRecord::default(),
        };
        Ok(record)
    }

    pub async fn remove(&self, token: &str) -> Result<(), ProgressError> {
        let path = self.path(token)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Persists every record a run broadcasts and republishes it, tagged with the
/// run token, to status subscribers. Ends once the run drops its sender.
pub fn spawn_forwarder(
    store: ProgressStore,
    token: String,
    mut rx: broadcast::Receiver<ProgressRecord>,
    events: broadcast::Sender<ProgressEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(record) => {
                    if let Err(err) = store.write(&token, &record).await {
                        warn!("progress write for run {token} failed: {err}");
                    }
                    let _ = events.send(ProgressEvent {
                        token: token.clone(),
                        record,
                    });
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("progress forwarder for run {token} skipped {skipped} records");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_url_safe() {
        let token = new_token();
        assert!(is_valid_token(&token));
        assert_ne!(token, new_token());
        assert!(!is_valid_token(""));
        assert!(!is_valid_token("../etc/passwd"));
        assert!(!is_valid_token("a b"));
        assert!(is_valid_token("run_1-A"));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("progress"));
        let record = ProgressRecord::at(3, 10, 1234.0);

        store.write("abc", &record).await.unwrap();
        assert_eq!(store.read("abc").await.unwrap(), record);
        assert!(!dir.path().join("progress/abc.json.tmp").exists());

        let body = std::fs::read_to_string(dir.path().join("progress/abc.json")).unwrap();
        assert!(body.contains("\"bestFitness\":1234.0"));
    }

    #[tokio::test]
    async fn test_absent_or_corrupt_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());

        assert_eq!(store.read("missing").await.unwrap(), ProgressRecord::default());

        std::fs::write(dir.path().join("broken.json"), b"{\"percent\": 4").unwrap();
        assert_eq!(store.read("broken").await.unwrap(), ProgressRecord::default());
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        let err = store.read("../x").await.unwrap_err();
        assert!(matches!(err, ProgressError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        store.write("gone", &ProgressRecord::started(5)).await.unwrap();
        store.remove("gone").await.unwrap();
        store.remove("gone").await.unwrap();
        assert_eq!(store.read("gone").await.unwrap(), ProgressRecord::default());
    }

    #[tokio::test]
    async fn test_forwarder_persists_last_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        let (tx, rx) = broadcast::channel(16);
        let (events, mut subscriber) = broadcast::channel(16);
        let handle = spawn_forwarder(store.clone(), "run".to_string(), rx, events);

        tx.send(ProgressRecord::at(1, 2, 10.0)).unwrap();
        tx.send(ProgressRecord::finished(2, 2, 5.0)).unwrap();
        drop(tx);
        handle.await.unwrap();

        let stored = store.read("run").await.unwrap();
        assert!(stored.done);
        assert_eq!(stored.percent, 100.0);
        assert_eq!(subscriber.recv().await.unwrap().record.generation, 1);
        assert_eq!(subscriber.recv().await.unwrap().token, "run");
    }
}
