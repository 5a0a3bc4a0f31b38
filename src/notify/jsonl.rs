//! Append-only JSONL history store.
//!
//! Each call appends one self-describing line, keyed by room code, so a
//! separate history view can rebuild finished sessions by replaying the file.

use super::{NotifyResult, SessionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// File-backed session store
pub struct JsonlStore {
    path: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum HistoryRecord<'a> {
    Room {
        code: &'a str,
        finished_at: String,
    },
    Participant {
        code: &'a str,
        persistent_id: &'a str,
        name: &'a str,
    },
    Vote {
        code: &'a str,
        persistent_id: &'a str,
        name: &'a str,
        emoji: &'a str,
        scale: u8,
    },
}

impl JsonlStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn append(&self, record: &HistoryRecord<'_>) -> NotifyResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonlStore {
    async fn save_finished_room(
        &self,
        code: &str,
        finished_at: DateTime<Utc>,
    ) -> NotifyResult<()> {
        self.append(&HistoryRecord::Room {
            code,
            finished_at: finished_at.to_rfc3339(),
        })
        .await
    }

    async fn append_participant(
        &self,
        code: &str,
        persistent_id: &str,
        name: &str,
    ) -> NotifyResult<()> {
        self.append(&HistoryRecord::Participant {
            code,
            persistent_id,
            name,
        })
        .await
    }

    async fn append_vote(
        &self,
        code: &str,
        persistent_id: &str,
        name: &str,
        emoji: &str,
        scale: u8,
    ) -> NotifyResult<()> {
        self.append(&HistoryRecord::Vote {
            code,
            persistent_id,
            name,
            emoji,
            scale,
        })
        .await
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}
