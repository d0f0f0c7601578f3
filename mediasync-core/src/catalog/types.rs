//! Catalog plane types

use std::path::Path;

/// A successful catalog mutation, delivered through the dispatch queue
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogChange {
    UserAdded { user_token: String },
    UserRemoved { user_token: String },
    /// A media item was uploaded to this playlist
    Uploaded { playlist_id: String },
    Deleted { media_id: String },
}

impl CatalogChange {
    /// Playlist whose media list changed, when known
    pub fn playlist_id(&self) -> Option<&str> {
        match self {
            CatalogChange::Uploaded { playlist_id } => Some(playlist_id),
            _ => None,
        }
    }

    /// Whether media lists may be stale after this change
    pub fn affects_media(&self) -> bool {
        matches!(self, CatalogChange::Uploaded { .. } | CatalogChange::Deleted { .. })
    }
}

/// Upload formats the service accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Mp4,
    Wav,
}

impl MediaKind {
    /// Match a file extension (without the dot, case-insensitive)
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mp4" => Some(MediaKind::Mp4),
            "wav" => Some(MediaKind::Wav),
            _ => None,
        }
    }

    /// Match a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaKind::Mp4 => "video/mp4",
            MediaKind::Wav => "audio/x-wav",
        }
    }

    /// File name sent in the multipart part
    pub fn file_name(&self) -> &'static str {
        match self {
            MediaKind::Mp4 => "file.mp4",
            MediaKind::Wav => "file.wav",
        }
    }
}
