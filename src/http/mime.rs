//! Content-Type lookup by file extension.

use std::path::Path;

/// Used when the extension is missing or unknown.
pub const FALLBACK: &str = "application/octet-stream";

/// Content type for `path`, guessed from its extension.
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK)
        .to_string()
}

/// Whether responses of this type are worth compressing.
pub fn is_text(content_type: &str) -> bool {
    content_type.contains("text")
}
