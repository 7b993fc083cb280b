//! Discord webhook client.

use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::embed::Embed;
use crate::error::{RelayError, Result};
use crate::relay::ChatSink;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DiscordWebhook {
    http: Client,
    url: Url,
}

#[derive(Deserialize)]
struct WebhookMessage {
    id: String,
}

impl DiscordWebhook {
    pub fn new(webhook: &str, user_agent: &str) -> Result<Self> {
        let url = Url::parse(webhook)
            .map_err(|e| RelayError::DiscordRequest(format!("invalid webhook url: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(RelayError::DiscordRequest(format!(
                "invalid webhook url: {webhook}"
            )));
        }
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RelayError::DiscordRequest(format!("failed to build client: {e}")))?;
        Ok(Self { http, url })
    }

    /// Executes the webhook and returns the created message id.
    fn execute(&self, body: &Value) -> Result<String> {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("wait", "true");
        let response = send(self.http.post(url).json(body))?;
        let message: WebhookMessage = response
            .json()
            .map_err(|e| RelayError::DiscordDecode(e.to_string()))?;
        Ok(message.id)
    }

    fn message_url(&self, message_id: &str) -> Result<Url> {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .map_err(|()| RelayError::DiscordRequest("webhook url has no path".into()))?
            .pop_if_empty()
            .push("messages")
            .push(message_id);
        Ok(url)
    }
}

impl ChatSink for DiscordWebhook {
    fn publish(&self, embed: &Embed) -> Result<String> {
        self.execute(&json!({ "embeds": [embed] }))
    }

    fn delete(&self, message_id: &str) -> Result<()> {
        send(self.http.delete(self.message_url(message_id)?))?;
        Ok(())
    }

    fn send_text(&self, text: &str) -> Result<()> {
        self.execute(&json!({
            "content": text,
            "allowed_mentions": { "parse": [] },
        }))?;
        Ok(())
    }
}

fn send(request: RequestBuilder) -> Result<Response> {
    let response = request
        .send()
        .map_err(|e| RelayError::DiscordRequest(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(RelayError::DiscordStatus {
            status: status.as_u16(),
        });
    }
    Ok(response)
}
