//! Text formatting for each sink.

use crate::types::DiscoveredItem;

/// Descriptions shorter than this are left out of the Matrix caption.
const MIN_CAPTION_DESCRIPTION: usize = 50;

/// Body of the Matrix `m.image` event.
pub fn matrix_caption(item: &DiscoveredItem, description: &str) -> String {
    let base = format!(
        "Link: {}\nUploader: {}\nResolution: {}\nType: {}\nSize: {}\nTags: {}",
        item.url,
        item.uploader,
        item.resolution,
        item.file_type,
        human_file_size(item.file_size),
        item.tags.join(", "),
    );

    let description = description.trim();
    if description.chars().count() >= MIN_CAPTION_DESCRIPTION {
        format!("{}\nDescription: {}", base, description)
    } else {
        base
    }
}

/// Mastodon status text, hashtags last.
pub fn mastodon_status(item: &DiscoveredItem, description: &str) -> String {
    let hashtags = item
        .tags
        .iter()
        .map(|t| format!("#{}", compact_tag(t)))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "Link: {}\nUploader: {}\nResolution: {}\nType: {}\nSize: {:.2} MB\nDescription: {}\n\n{}",
        item.url,
        item.uploader,
        item.resolution,
        item.file_type,
        item.file_size as f64 / (1024.0 * 1024.0),
        description,
        hashtags,
    )
}

/// ntfy message body.
pub fn ntfy_message(description: &str) -> String {
    format!("Description: {}", description)
}

/// ntfy tags: no `#` and no whitespace.
pub fn ntfy_tags(item: &DiscoveredItem) -> Vec<String> {
    item.tags.iter().map(|t| compact_tag(t)).collect()
}

fn compact_tag(tag: &str) -> String {
    tag.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Byte count as `bytes`, `KB`, `MB` or `GB` with two decimals.
pub fn human_file_size(bytes: u64) -> String {
    const KB: u64 = 1 << 10;
    const MB: u64 = 1 << 20;
    const GB: u64 = 1 << 30;

    match bytes {
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2} KB", b as f64 / KB as f64),
        b => format!("{} bytes", b),
    }
}
