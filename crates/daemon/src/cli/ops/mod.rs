pub mod archive;
pub mod delete;
pub mod download;
pub mod history;
pub mod info;
pub mod init;
pub mod list;
pub mod metadata;
pub mod restore;
pub mod stats;
pub mod upload;
pub mod version;

use chrono::{DateTime, Local, Utc};

crate::command_enum! {
    (Init, init::Init),
    (Upload, upload::Upload),
    (Version, version::NewVersion),
    (Metadata, metadata::UpdateMetadata),
    (List, list::List),
    (Info, info::Info),
    (History, history::History),
    (Download, download::Download),
    (Archive, archive::Archive),
    (Restore, restore::Restore),
    (Delete, delete::Delete),
    (Stats, stats::Stats),
}

pub(crate) fn format_size(size: u64) -> String {
    let mut value = size as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} TB")
}

pub(crate) fn format_date(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Cut `text` to `max` characters, marking the cut with `...`.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}
