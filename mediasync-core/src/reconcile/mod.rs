//! Local playback reconciliation

mod binding;
mod headless;
mod widget;

pub use binding::{BindingState, PlayerBinding, Reconciliation};
pub use headless::{HeadlessStatus, HeadlessWidget, WidgetCall};
pub use widget::{MediaWidget, WidgetBackend};

use crate::config::join_url;

/// Absolute media URL for a server-relative file path
pub fn media_url(base_address: &str, file_path: &str) -> String {
    join_url(base_address, file_path)
}
