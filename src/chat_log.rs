//! Append-only JSONL log of completed exchanges, replayed into the
//! conversation history at startup.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::conversation::ConversationManager;
use crate::models::ChatLogRecord;

pub struct ChatLog {
    path: PathBuf,
    // Serializes appends so concurrent exchanges never interleave lines.
    write_lock: Mutex<()>,
}

impl ChatLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &ChatLogRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open chat log: {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Reads every well-formed record. A missing file is an empty log;
    /// malformed lines, including ones that are not valid UTF-8, are skipped.
    pub fn replay(&self) -> Result<Vec<ChatLogRecord>> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read chat log: {}", self.path.display()))
            }
        };
        Ok(parse_records(&content))
    }

    /// Replays the log into `conversation`, skipping records with an empty
    /// query or response. Returns the number of exchanges restored.
    pub fn seed(&self, conversation: &mut ConversationManager) -> Result<usize> {
        let mut restored = 0;
        for record in self.replay()? {
            if record.user_query.is_empty() || record.response.is_empty() {
                continue;
            }
            conversation.update(record.user_query, record.response);
            restored += 1;
        }
        tracing::info!(exchanges = restored, path = %self.path.display(), "chat history restored");
        Ok(restored)
    }
}

fn parse_records(content: &[u8]) -> Vec<ChatLogRecord> {
    content
        .split(|b| *b == b'\n')
        .filter_map(|raw| match std::str::from_utf8(raw) {
            Ok(line) => Some(line),
            Err(e) => {
                tracing::debug!(error = %e, "skipping non-UTF-8 chat log line");
                None
            }
        })
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<ChatLogRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed chat log line");
                None
            }
        })
        .collect()
}
