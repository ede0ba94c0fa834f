use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::Result;

/// Normalize a user-provided path string into a PathBuf.
///
/// - Trims leading/trailing whitespace
/// - Strips surrounding single or double quotes if present
/// - Expands a leading '~' to the HOME directory when possible
pub fn normalize_user_input_path(input: &str) -> PathBuf {
    let unquoted = strip_quotes(input.trim());

    if unquoted.starts_with('~') {
        let without_tilde = unquoted
            .strip_prefix("~/")
            .or_else(|| unquoted.strip_prefix('~'))
            .unwrap_or(unquoted);
        if let Some(home) = std::env::var_os("HOME") {
            let mut buf = PathBuf::from(home);
            if !without_tilde.is_empty() {
                buf.push(without_tilde);
            }
            return buf;
        }
    }

    PathBuf::from(unquoted)
}

/// Reduce a client-supplied upload name to a bare, safe file name.
///
/// Returns `None` when nothing usable is left (empty, `.`/`..`, hidden).
pub fn sanitize_file_name(input: &str) -> Option<String> {
    let unquoted = strip_quotes(input.trim());
    // Browsers on Windows may send the full client path.
    let last = unquoted.rsplit(['/', '\\']).next().unwrap_or("").trim();

    if last.is_empty() || last.starts_with('.') {
        return None;
    }
    Some(last.to_string())
}

fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Shell-style wildcard match supporting `*` and `?`
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ni;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ni = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Finds the most recently modified file in `dir` whose name matches `pattern`
///
/// A missing directory is treated as empty.
pub async fn newest_matching(dir: &Path, pattern: &str) -> Result<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !wildcard_match(pattern, &name) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let is_newer = newest.as_ref().map_or(true, |(best, _)| modified > *best);
        if is_newer {
            newest = Some((modified, entry.path()));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

/// Lower-cased extension of `path` including the leading dot, or empty
pub fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Image MIME type from a file extension; unknown extensions map to JPEG
pub fn image_mime_for_path(path: &Path) -> mime::Mime {
    match dotted_extension(path).as_str() {
        ".png" => mime::IMAGE_PNG,
        ".gif" => mime::IMAGE_GIF,
        ".webp" => "image/webp".parse().unwrap_or(mime::IMAGE_JPEG),
        _ => mime::IMAGE_JPEG,
    }
}
