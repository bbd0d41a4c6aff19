//! Wallhaven-backed `Catalog`.

use async_trait::async_trait;
use wallhaven_client::{SearchParams, WallhavenClient};

use crate::error::Result;
use crate::traits::Catalog;
use crate::types::DiscoveredItem;

pub struct WallhavenCatalog {
    client: WallhavenClient,
    params: SearchParams,
}

impl WallhavenCatalog {
    pub fn new(client: WallhavenClient, params: SearchParams) -> Self {
        Self { client, params }
    }
}

#[async_trait]
impl Catalog for WallhavenCatalog {
    async fn search(&self, range: &str) -> Result<Vec<String>> {
        Ok(self.client.search(range, &self.params).await?)
    }

    async fn fetch_item(&self, id: &str) -> Result<DiscoveredItem> {
        let wallpaper = self.client.wallpaper(id).await?;
        Ok(wallpaper.into())
    }
}
