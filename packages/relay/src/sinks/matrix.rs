//! Matrix room sink, talking to the client-server API directly.
//!
//! The access token is cached in `token_file`; password login only happens
//! when no cached token exists.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::GenericImageView;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::caption;
use crate::error::{SinkError, SinkResult};
use crate::traits::PublishSink;
use crate::types::DiscoveredItem;

/// Wallhaven serves every thumbnail as JPEG
const THUMBNAIL_MIME: &str = "image/jpeg";

#[derive(Debug, Clone)]
pub struct MatrixOptions {
    pub server_url: String,
    pub user: String,
    pub password: String,
    pub room_id: String,
    pub token_file: Option<PathBuf>,
}

pub struct MatrixSink {
    client: reqwest::Client,
    server_url: String,
    room_id: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    content_uri: String,
}

impl MatrixSink {
    /// Reuse a cached access token or log in with the password.
    pub async fn connect(client: reqwest::Client, options: MatrixOptions) -> SinkResult<Self> {
        let server_url = options.server_url.trim_end_matches('/').to_string();

        let cached = match &options.token_file {
            Some(path) => load_token(path).await,
            None => None,
        };

        let access_token = match cached {
            Some(token) => {
                debug!("Using cached Matrix access token");
                token
            }
            None => {
                let token = login(&client, &server_url, &options.user, &options.password).await?;
                info!(user = %options.user, "Logged in to Matrix");
                if let Some(path) = &options.token_file {
                    if let Err(e) = save_token(path, &token).await {
                        warn!(path = %path.display(), error = %e, "Failed to save Matrix token");
                    }
                }
                token
            }
        };

        Ok(Self::with_token(client, server_url, options.room_id, access_token))
    }

    /// Build a sink from an existing access token.
    pub fn with_token(
        client: reqwest::Client,
        server_url: impl Into<String>,
        room_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            server_url: server_url.into(),
            room_id: room_id.into(),
            access_token: access_token.into(),
        }
    }

    async fn upload(&self, bytes: Vec<u8>, content_type: &str, filename: &str) -> SinkResult<String> {
        let resp = self
            .client
            .post(format!("{}/_matrix/media/v3/upload", self.server_url))
            .query(&[("filename", filename)])
            .bearer_auth(&self.access_token)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await?;

        let uploaded: UploadResponse = check(resp).await?.json().await?;
        Ok(uploaded.content_uri)
    }

    async fn send_message(&self, content: serde_json::Value) -> SinkResult<()> {
        let txn_id = uuid::Uuid::new_v4();
        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/send/m.room.message/{}",
            self.server_url,
            encode_path_segment(&self.room_id),
            txn_id
        );

        let resp = self
            .client
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&content)
            .send()
            .await?;

        check(resp).await?;
        Ok(())
    }

    async fn fetch_thumbnail(&self, url: &str) -> SinkResult<Vec<u8>> {
        let resp = self.client.get(url).send().await?;
        let bytes = check(resp).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl PublishSink for MatrixSink {
    fn name(&self) -> &str {
        "matrix"
    }

    async fn publish(
        &self,
        item: &DiscoveredItem,
        description: &str,
        asset: &Path,
    ) -> SinkResult<()> {
        let caption = caption::matrix_caption(item, description);
        debug!(item_id = %item.id, "Sending image to Matrix");

        let main_bytes = tokio::fs::read(asset).await?;
        let main_uri = self
            .upload(main_bytes, &item.file_type, item.file_name())
            .await?;

        let thumb_bytes = self.fetch_thumbnail(&item.thumbnail).await?;
        let thumb_hash = blurhash_of(thumb_bytes.clone()).await;
        let thumb_uri = self
            .upload(thumb_bytes, THUMBNAIL_MIME, &format!("thumb-{}", item.file_name()))
            .await?;

        let content = image_content(
            item,
            &caption,
            &main_uri,
            &thumb_uri,
            &thumb_hash.unwrap_or_default(),
        );
        self.send_message(content).await?;
        debug!(item_id = %item.id, "Matrix message sent");
        Ok(())
    }
}

async fn login(
    client: &reqwest::Client,
    server_url: &str,
    user: &str,
    password: &str,
) -> SinkResult<String> {
    let body = json!({
        "type": "m.login.password",
        "identifier": { "type": "m.id.user", "user": user },
        "password": password,
    });

    let resp = client
        .post(format!("{}/_matrix/client/v3/login", server_url))
        .json(&body)
        .send()
        .await?;

    let login: LoginResponse = check(resp).await?.json().await?;
    Ok(login.access_token)
}

async fn load_token(path: &Path) -> Option<String> {
    let token = tokio::fs::read_to_string(path).await.ok()?;
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

async fn save_token(path: &Path, token: &str) -> std::io::Result<()> {
    tokio::fs::write(path, token).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    Ok(())
}

async fn check(resp: reqwest::Response) -> SinkResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    warn!(status = %status, error = %body, "Matrix API error");
    Err(SinkError::Api {
        service: "matrix",
        status: status.as_u16(),
        body,
    })
}

/// `m.image` event body for an uploaded wallpaper and its thumbnail.
fn image_content(
    item: &DiscoveredItem,
    caption: &str,
    main_uri: &str,
    thumb_uri: &str,
    blurhash: &str,
) -> serde_json::Value {
    json!({
        "msgtype": "m.image",
        "filename": item.file_name(),
        "body": caption,
        "url": main_uri,
        "info": {
            "mimetype": item.file_type,
            "size": item.file_size,
            "thumbnail_url": thumb_uri,
            "thumbnail_info": { "mimetype": THUMBNAIL_MIME },
            "blurhash": blurhash,
        },
    })
}

/// 4x3 blurhash of an encoded image; `None` if it cannot be decoded.
async fn blurhash_of(bytes: Vec<u8>) -> Option<String> {
    let result = tokio::task::spawn_blocking(move || -> Result<String, String> {
        let img = image::load_from_memory(&bytes).map_err(|e| e.to_string())?;
        // The hash only carries a few colour components; a small copy is enough
        let small = img.thumbnail(64, 64);
        let (width, height) = small.dimensions();
        let rgba = small.to_rgba8();
        blurhash::encode(4, 3, width, height, rgba.as_raw()).map_err(|e| e.to_string())
    })
    .await;

    match result {
        Ok(Ok(hash)) => Some(hash),
        Ok(Err(e)) => {
            debug!(error = %e, "Blurhash unavailable");
            None
        }
        Err(e) => {
            warn!(error = %e, "Blurhash task failed");
            None
        }
    }
}

fn encode_path_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}
