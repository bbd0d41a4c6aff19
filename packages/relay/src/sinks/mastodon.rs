//! Mastodon sink: upload media, then post a status referencing it.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::caption;
use crate::error::{SinkError, SinkResult};
use crate::media::{self, MediaLimits};
use crate::traits::PublishSink;
use crate::types::DiscoveredItem;

pub struct MastodonSink {
    client: reqwest::Client,
    server: String,
    access_token: String,
    limits: MediaLimits,
}

#[derive(Debug, Deserialize)]
struct MediaAttachment {
    id: String,
}

impl MastodonSink {
    pub fn new(
        client: reqwest::Client,
        server: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            server: server.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            limits: MediaLimits::MASTODON,
        }
    }

    pub fn with_limits(mut self, limits: MediaLimits) -> Self {
        self.limits = limits;
        self
    }

    async fn upload_media(&self, path: &Path) -> SinkResult<String> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image.jpg")
            .to_string();
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.as_ref())?;
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(format!("{}/api/v2/media", self.server))
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()
            .await?;

        let attachment: MediaAttachment = check(resp).await?.json().await?;
        Ok(attachment.id)
    }

    async fn post_status(&self, status: &str, media_id: &str) -> SinkResult<()> {
        let body = serde_json::json!({
            "status": status,
            "media_ids": [media_id],
            "visibility": "public",
        });

        let resp = self
            .client
            .post(format!("{}/api/v1/statuses", self.server))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        check(resp).await?;
        Ok(())
    }
}

async fn check(resp: reqwest::Response) -> SinkResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    warn!(status = %status, error = %body, "Mastodon API error");
    Err(SinkError::Api {
        service: "mastodon",
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl PublishSink for MastodonSink {
    fn name(&self) -> &str {
        "mastodon"
    }

    async fn publish(
        &self,
        item: &DiscoveredItem,
        description: &str,
        asset: &Path,
    ) -> SinkResult<()> {
        // A re-encoded copy is removed when `prepared` goes out of scope
        let prepared = media::prepare_for_upload(asset, self.limits).await?;
        if prepared.is_reencoded() {
            debug!(item_id = %item.id, "Uploading re-encoded copy to Mastodon");
        }

        let media_id = self.upload_media(prepared.path()).await?;
        let status = caption::mastodon_status(item, description);
        self.post_status(&status, &media_id).await?;

        debug!(item_id = %item.id, media_id = %media_id, "Mastodon status posted");
        Ok(())
    }
}
