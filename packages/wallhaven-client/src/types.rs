use serde::{Deserialize, Serialize};

/// Query parameters for `/api/v1/search`.
///
/// Field names follow the YAML keys users already have in their config files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub categories: String,
    #[serde(default)]
    pub purity: String,
    #[serde(default)]
    pub sorting: String,
    #[serde(default)]
    pub order: String,
    #[serde(default, rename = "ai_filter")]
    pub ai_art_filter: String,
}

/// Full wallpaper record from `/api/v1/w/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Wallpaper {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub uploader: Option<Uploader>,
    pub resolution: String,
    pub file_size: u64,
    pub file_type: String,
    pub path: String,
    pub thumbs: Thumbs,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Uploader {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thumbs {
    pub original: String,
    #[serde(default)]
    pub large: Option<String>,
    #[serde(default)]
    pub small: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub name: String,
}

/// A search hit. Search results carry more fields, but only the id is stable
/// enough to rely on; the detail endpoint is authoritative for everything else.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub id: String,
}

/// Wrapper for Wallhaven API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_wallpaper() {
        let json = r#"{
            "data": {
                "id": "94x38z",
                "url": "https://wallhaven.cc/w/94x38z",
                "short_url": "https://whvn.cc/94x38z",
                "uploader": {"username": "alpha", "group": "User"},
                "resolution": "3840x2160",
                "file_size": 2350412,
                "file_type": "image/jpeg",
                "path": "https://w.wallhaven.cc/full/94/wallhaven-94x38z.jpg",
                "thumbs": {
                    "large": "https://th.wallhaven.cc/lg/94/94x38z.jpg",
                    "original": "https://th.wallhaven.cc/orig/94/94x38z.jpg",
                    "small": "https://th.wallhaven.cc/small/94/94x38z.jpg"
                },
                "tags": [{"id": 1, "name": "nature"}, {"id": 2, "name": "night sky"}]
            }
        }"#;

        let resp: ApiResponse<Wallpaper> = serde_json::from_str(json).unwrap();
        let wp = resp.data;
        assert_eq!(wp.id, "94x38z");
        assert_eq!(wp.uploader.unwrap().username, "alpha");
        assert_eq!(wp.file_size, 2350412);
        assert_eq!(wp.tags.len(), 2);
        assert_eq!(wp.tags[1].name, "night sky");
    }

    #[test]
    fn test_deserialize_search_ignores_extra_fields() {
        let json = r#"{"data": [{"id": "a1", "views": 10}, {"id": "b2"}], "meta": {"current_page": 1}}"#;
        let resp: ApiResponse<Vec<SearchHit>> = serde_json::from_str(json).unwrap();
        let ids: Vec<_> = resp.data.into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec!["a1", "b2"]);
    }
}
