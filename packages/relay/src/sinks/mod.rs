//! Publishing sinks and their construction from configuration.

pub mod mastodon;
pub mod matrix;
pub mod ntfy;

use std::sync::Arc;

use tracing::info;

pub use mastodon::MastodonSink;
pub use matrix::{MatrixOptions, MatrixSink};
pub use ntfy::NtfySink;

use crate::config::{Config, SinkKind};
use crate::error::{RelayError, Result};
use crate::traits::PublishSink;

/// Build every enabled sink. Matrix logs in here, so a bad password fails
/// startup rather than every item.
pub async fn build_sinks(config: &Config, client: reqwest::Client) -> Result<Vec<Arc<dyn PublishSink>>> {
    let mut sinks: Vec<Arc<dyn PublishSink>> = Vec::new();

    for kind in config.enabled_sinks() {
        let sink: Arc<dyn PublishSink> = match kind {
            SinkKind::Matrix => {
                let Some(m) = &config.matrix else { continue };
                let options = MatrixOptions {
                    server_url: m.server_url.clone(),
                    user: m.user.clone(),
                    password: m.password.clone(),
                    room_id: m.room_id.clone(),
                    token_file: m.token_file.clone(),
                };
                let sink = MatrixSink::connect(client.clone(), options).await?;
                Arc::new(sink)
            }
            SinkKind::Mastodon => {
                let Some(m) = &config.mastodon else { continue };
                Arc::new(MastodonSink::new(
                    client.clone(),
                    m.mastodon_server.clone(),
                    m.mastodon_token.clone(),
                ))
            }
            SinkKind::Ntfy => {
                let Some(n) = &config.ntfy else { continue };
                Arc::new(NtfySink::new(client.clone(), n.server.clone(), n.topic.clone()))
            }
        };
        info!(sink = sink.name(), "Sink enabled");
        sinks.push(sink);
    }

    if sinks.is_empty() {
        return Err(RelayError::Config("no sinks configured".to_string()));
    }

    Ok(sinks)
}
