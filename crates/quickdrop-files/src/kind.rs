//! Attachment classification.

use std::path::Path;

/// Attachment kind announced in file metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Anything else
    Unknown,
    /// `image/*`
    Image,
    /// `video/*`
    Video,
    /// Android package
    App,
    /// `audio/*`
    Audio,
}

const APK_MIME: &str = "application/vnd.android.package-archive";

/// Guess the MIME type and kind of a file from its extension.
///
/// Unknown extensions map to `application/octet-stream`.
#[must_use]
pub fn classify(path: &Path) -> (String, FileKind) {
    let is_apk = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("apk"));
    if is_apk {
        return (APK_MIME.to_string(), FileKind::App);
    }

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let kind = match mime.type_().as_str() {
        "image" => FileKind::Image,
        "video" => FileKind::Video,
        "audio" => FileKind::Audio,
        _ => FileKind::Unknown,
    };
    (mime.essence_str().to_string(), kind)
}
