//! Slack recap delivery via `chat.postMessage`.

use super::{NotifyError, NotifyResult, RecapSink};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

/// Posts recap texts to a Slack channel
pub struct SlackSink {
    client: reqwest::Client,
    token: String,
    channel: String,
}

impl SlackSink {
    pub fn new(token: String, channel: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            token,
            channel,
        }
    }
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl RecapSink for SlackSink {
    async fn post_recap(&self, code: &str, text: &str) -> NotifyResult<()> {
        let response: PostMessageResponse = self
            .client
            .post(POST_MESSAGE_URL)
            .bearer_auth(&self.token)
            .json(&PostMessageRequest {
                channel: &self.channel,
                text,
            })
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(NotifyError::Rejected(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        tracing::debug!("Recap for room {} posted to {}", code, self.channel);
        Ok(())
    }

    fn name(&self) -> &str {
        "slack"
    }
}
