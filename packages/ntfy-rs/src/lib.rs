// https://docs.ntfy.sh/publish/#attach-local-file

use reqwest::{header, Client};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum NtfyError {
    #[error("request to ntfy failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ntfy returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid header value for {0}")]
    InvalidHeader(&'static str),
}

#[derive(Debug, Clone)]
pub struct NtfyOptions {
    pub server: String,
    pub topic: String,
}

/// Message priority, sent as the `Priority` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Priority {
    Min,
    #[default]
    Low,
    Default,
    High,
    Max,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Min => "min",
            Priority::Low => "low",
            Priority::Default => "default",
            Priority::High => "high",
            Priority::Max => "max",
        }
    }
}

/// A file published as a notification attachment.
#[derive(Debug, Clone, Default)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub body: Vec<u8>,
    pub message: String,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub priority: Priority,
}

/// Subset of the JSON ntfy echoes back for a published message.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishedMessage {
    pub id: String,
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NtfyService {
    options: NtfyOptions,
    client: Client,
}

impl NtfyService {
    pub fn new(options: NtfyOptions) -> Self {
        Self {
            options,
            client: Client::new(),
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn topic_url(&self) -> String {
        format!(
            "{}/{}",
            self.options.server.trim_end_matches('/'),
            self.options.topic
        )
    }

    /// PUT a file to the topic. ntfy takes the message metadata from headers.
    pub async fn publish_attachment(
        &self,
        attachment: Attachment,
    ) -> Result<PublishedMessage, NtfyError> {
        let headers = attachment_headers(&attachment)?;

        let response = self
            .client
            .put(self.topic_url())
            .headers(headers)
            .body(attachment.body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, topic = %self.options.topic, "ntfy publish failed");
            return Err(NtfyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<PublishedMessage>().await?)
    }
}

fn attachment_headers(attachment: &Attachment) -> Result<header::HeaderMap, NtfyError> {
    let mut headers = header::HeaderMap::new();

    insert(&mut headers, "filename", &attachment.filename)?;
    insert(&mut headers, "message", &attachment.message)?;
    insert(&mut headers, "priority", attachment.priority.as_str())?;
    if let Some(title) = &attachment.title {
        insert(&mut headers, "title", title)?;
    }
    if !attachment.tags.is_empty() {
        insert(&mut headers, "tags", &attachment.tags.join(","))?;
    }
    insert(&mut headers, "content-type", &attachment.content_type)?;

    Ok(headers)
}

fn insert(
    headers: &mut header::HeaderMap,
    name: &'static str,
    value: &str,
) -> Result<(), NtfyError> {
    // Raw UTF-8 is accepted by ntfy; newlines are not valid in a header and are
    // escaped the way ntfy's own CLI does it.
    let escaped = value.replace('\n', "\\n");
    let value = header::HeaderValue::from_bytes(escaped.as_bytes())
        .map_err(|_| NtfyError::InvalidHeader(name))?;
    headers.insert(name, value);
    Ok(())
}
