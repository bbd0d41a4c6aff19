//! Image descriptions from an OpenAI vision model.

use std::path::Path;

use async_trait::async_trait;
use openai_client::OpenAIClient;
use tracing::debug;

use crate::error::Result;
use crate::traits::Describer;

const PROMPT: &str = "Describe this image in less than 200 characters.";
const MAX_TOKENS: u32 = 120;

pub struct OpenAIDescriber {
    client: OpenAIClient,
    model: String,
}

impl OpenAIDescriber {
    pub fn new(client: OpenAIClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Describer for OpenAIDescriber {
    async fn describe(&self, image: &Path) -> Result<String> {
        let bytes = tokio::fs::read(image).await?;
        let mime = mime_guess::from_path(image).first_or(mime_guess::mime::IMAGE_JPEG);

        let text = self
            .client
            .describe_image(&self.model, PROMPT, mime.as_ref(), &bytes, MAX_TOKENS)
            .await?;

        let text = text.trim().to_string();
        debug!(model = %self.model, chars = text.chars().count(), "Image described");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let describer = OpenAIDescriber::new(OpenAIClient::new("sk-test"), "gpt-4o");
        let err = describer
            .describe(Path::new("/nonexistent/thumb.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Io(_)));
    }

    #[tokio::test]
    async fn test_api_failure_is_description_error() {
        let dir = tempfile::tempdir().unwrap();
        let thumb = dir.path().join("thumb.jpg");
        std::fs::write(&thumb, b"jpeg").unwrap();

        let client = OpenAIClient::new("sk-test").with_base_url("http://127.0.0.1:9/v1");
        let describer = OpenAIDescriber::new(client, "gpt-4o");

        let err = describer.describe(&thumb).await.unwrap_err();
        assert!(matches!(err, RelayError::Description(_)));
    }
}
