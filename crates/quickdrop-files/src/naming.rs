//! File names on the wire and on disk.

use std::path::{Path, PathBuf};

const FORBIDDEN: &[char] = &['/', '\\', '?', '%', '*', ':', '|', '"', '<', '>', '='];

/// Replace characters that are unsafe in a file name with `_`.
///
/// # Examples
///
/// ```
/// use quickdrop_files::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("a/b:c?.txt"), "a_b_c_.txt");
/// assert_eq!(sanitize_file_name("report=final.pdf"), "report_final.pdf");
/// ```
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect()
}

/// Sanitised name that is safe as a single path component inside the download directory.
fn component_name(name: &str) -> String {
    let name: String = sanitize_file_name(name)
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();
    if name.is_empty() || name.chars().all(|c| c == '.') {
        return "_".repeat(name.len().max(1));
    }
    name
}

/// First free path for `name` inside `dir`: `name`, then `stem (1).ext`, `stem (2).ext`, ...
///
/// A path counts as taken if it exists on disk or appears in `reserved` (names already
/// handed out for the same transfer).
#[must_use]
pub fn unique_destination(dir: &Path, name: &str, reserved: &[PathBuf]) -> PathBuf {
    let name = component_name(name);
    let taken = |p: &Path| p.exists() || reserved.iter().any(|r| r == p);

    let first = dir.join(&name);
    if !taken(&first) {
        return first;
    }

    let as_path = Path::new(&name);
    let stem = as_path
        .file_stem()
        .map_or_else(|| name.clone(), |s| s.to_string_lossy().into_owned());
    let ext = as_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned());

    let mut counter = 1u32;
    loop {
        let candidate = match &ext {
            Some(ext) => dir.join(format!("{stem} ({counter}).{ext}")),
            None => dir.join(format!("{stem} ({counter})")),
        };
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}
