//! ntfy push notification sink.

use std::path::Path;

use async_trait::async_trait;
use ntfy::{Attachment, NtfyOptions, NtfyService, Priority};
use tracing::debug;

use crate::caption;
use crate::error::SinkResult;
use crate::traits::PublishSink;
use crate::types::DiscoveredItem;

pub struct NtfySink {
    service: NtfyService,
}

impl NtfySink {
    pub fn new(client: reqwest::Client, server: impl Into<String>, topic: impl Into<String>) -> Self {
        let service = NtfyService::new(NtfyOptions {
            server: server.into(),
            topic: topic.into(),
        })
        .with_client(client);
        Self { service }
    }
}

#[async_trait]
impl PublishSink for NtfySink {
    fn name(&self) -> &str {
        "ntfy"
    }

    async fn publish(
        &self,
        item: &DiscoveredItem,
        description: &str,
        asset: &Path,
    ) -> SinkResult<()> {
        let body = tokio::fs::read(asset).await?;

        let attachment = Attachment {
            filename: item.file_name().to_string(),
            content_type: content_type_for(asset),
            body,
            message: caption::ntfy_message(description),
            title: Some(item.url.clone()),
            tags: caption::ntfy_tags(item),
            priority: Priority::Low,
        };

        let published = self.service.publish_attachment(attachment).await?;
        debug!(item_id = %item.id, message_id = %published.id, "ntfy notification sent");
        Ok(())
    }
}

/// Content type from the file extension; anything unknown is sent as bytes.
fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}
