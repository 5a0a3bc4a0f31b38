//! The notifier boundary: recap delivery and finished-session persistence.
//!
//! Both collaborators are fire-and-forget. Dispatch happens on a background
//! task so a slow or broken collaborator can never stall a state transition
//! or a presence broadcast; failures are logged and dropped.

mod jsonl;
mod slack;

pub use jsonl::JsonlStore;
pub use slack::SlackSink;

use crate::types::{PersistentId, RoomCode, VoteValue};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;

/// Result type for collaborator calls
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors a collaborator call can produce. Never surfaced to participants.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("collaborator rejected the payload: {0}")]
    Rejected(String),
}

/// Receives a text recap when a round is revealed or a session finishes
#[async_trait]
pub trait RecapSink: Send + Sync {
    async fn post_recap(&self, code: &str, text: &str) -> NotifyResult<()>;

    /// Name of this sink, for logging
    fn name(&self) -> &str;
}

/// Append-only history store for finished sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_finished_room(&self, code: &str, finished_at: DateTime<Utc>)
        -> NotifyResult<()>;

    async fn append_participant(
        &self,
        code: &str,
        persistent_id: &str,
        name: &str,
    ) -> NotifyResult<()>;

    async fn append_vote(
        &self,
        code: &str,
        persistent_id: &str,
        name: &str,
        emoji: &str,
        scale: u8,
    ) -> NotifyResult<()>;

    /// Name of this store, for logging
    fn name(&self) -> &str;
}

/// Flattened per-participant snapshot handed across the boundary
#[derive(Debug, Clone)]
pub struct SessionParticipant {
    pub persistent_id: PersistentId,
    pub display_name: String,
    pub vote: Option<VoteValue>,
}

/// Build the recap text for a room: header, one line per participant, and
/// the average over everyone (non-voters count as zero, like the original
/// Slack recap did).
pub fn recap_text(code: &str, participants: &[SessionParticipant]) -> String {
    let average = if participants.is_empty() {
        0.0
    } else {
        participants
            .iter()
            .filter_map(|p| p.vote.as_ref())
            .map(|v| v.scale as f64)
            .sum::<f64>()
            / participants.len() as f64
    };

    let mut lines = vec![
        format!("🎉 Mood Voting Recap for Room {}", code),
        format!("👥 Participants: {}", participants.len()),
        String::new(),
    ];
    for participant in participants {
        match &participant.vote {
            Some(vote) => lines.push(format!(
                "{}: {} {}/10",
                participant.display_name, vote.emoji, vote.scale
            )),
            None => lines.push(format!("{}: No vote", participant.display_name)),
        }
    }
    lines.push(String::new());
    lines.push(format!("📊 Average: {:.1}/10", average));
    lines.join("\n")
}

/// Dispatcher for the two collaborator boundaries
pub struct Notifier {
    recap: Option<Arc<dyn RecapSink>>,
    store: Option<Arc<dyn SessionStore>>,
}

impl Notifier {
    pub fn new(recap: Option<Arc<dyn RecapSink>>, store: Option<Arc<dyn SessionStore>>) -> Self {
        Self { recap, store }
    }

    /// No collaborators configured; every dispatch is a no-op
    pub fn disabled() -> Self {
        Self {
            recap: None,
            store: None,
        }
    }

    /// Hand a recap to the notification collaborator, off the critical path
    pub fn spawn_recap(&self, code: RoomCode, participants: Vec<SessionParticipant>) {
        let Some(sink) = self.recap.clone() else {
            return;
        };
        tokio::spawn(async move {
            let text = recap_text(&code, &participants);
            if let Err(e) = sink.post_recap(&code, &text).await {
                tracing::warn!("Recap delivery via {} failed: {}", sink.name(), e);
            }
        });
    }

    /// Hand a finished-session snapshot to the history collaborator, off the
    /// critical path. The caller guards against double dispatch with the
    /// room's `finished` flag.
    pub fn spawn_persist(
        &self,
        code: RoomCode,
        finished_at: DateTime<Utc>,
        participants: Vec<SessionParticipant>,
    ) {
        let Some(store) = self.store.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) =
                persist_session(store.as_ref(), &code, finished_at, &participants).await
            {
                tracing::warn!("History snapshot via {} failed: {}", store.name(), e);
            }
        });
    }
}

async fn persist_session(
    store: &dyn SessionStore,
    code: &str,
    finished_at: DateTime<Utc>,
    participants: &[SessionParticipant],
) -> NotifyResult<()> {
    store.save_finished_room(code, finished_at).await?;
    for participant in participants {
        store
            .append_participant(code, &participant.persistent_id, &participant.display_name)
            .await?;
        if let Some(vote) = &participant.vote {
            store
                .append_vote(
                    code,
                    &participant.persistent_id,
                    &participant.display_name,
                    &vote.emoji,
                    vote.scale,
                )
                .await?;
        }
    }
    Ok(())
}

/// Configuration for the collaborator boundaries
#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    /// Slack bot token for recap delivery
    pub slack_token: Option<String>,
    /// Slack channel the recap is posted to
    pub slack_channel: Option<String>,
    /// Path of the append-only history file
    pub history_path: Option<PathBuf>,
}

impl NotifyConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let non_empty = |value: String| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        };

        Self {
            slack_token: std::env::var("SLACK_BOT_TOKEN").ok().and_then(non_empty),
            slack_channel: std::env::var("SLACK_CHANNEL_ID").ok().and_then(non_empty),
            history_path: match std::env::var("HISTORY_PATH") {
                Ok(path) => non_empty(path).map(PathBuf::from),
                Err(_) => Some(PathBuf::from("history.jsonl")),
            },
        }
    }

    /// Build the notifier with whichever collaborators are configured
    pub fn build_notifier(&self) -> Notifier {
        let recap: Option<Arc<dyn RecapSink>> =
            match (self.slack_token.as_ref(), self.slack_channel.as_ref()) {
                (Some(token), Some(channel)) => {
                    Some(Arc::new(SlackSink::new(token.clone(), channel.clone())))
                }
                _ => {
                    tracing::warn!(
                        "Missing SLACK_BOT_TOKEN or SLACK_CHANNEL_ID, recaps will be skipped"
                    );
                    None
                }
            };

        let store: Option<Arc<dyn SessionStore>> = self
            .history_path
            .as_ref()
            .map(|path| Arc::new(JsonlStore::new(path.clone())) as Arc<dyn SessionStore>);

        Notifier::new(recap, store)
    }
}
