//! Inline message markers rewritten into CQ codes before sending.
//!
//! `[@all]`, `[@<id>]`, `[image:<url or path>]`.

use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

/// Longest message body the gateway accepts.
pub const MAX_MESSAGE_CHARS: usize = 4500;

static AT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[@(all|\d+)\]").expect("at regex is valid"));

static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[image:([^\]]+)\]").expect("image regex is valid"));

/// Truncate to [`MAX_MESSAGE_CHARS`] and rewrite inline markers.
pub fn render(text: &str) -> String {
    let truncated = truncate(text);
    let with_at = AT_RE.replace_all(&truncated, "[CQ:at,qq=$1]");
    IMAGE_RE
        .replace_all(&with_at, |caps: &Captures| {
            format!("[CQ:image,file={}]", image_source(caps[1].trim()))
        })
        .into_owned()
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((idx, _)) => {
            tracing::warn!(
                "✂️ Message truncated to {} characters",
                MAX_MESSAGE_CHARS
            );
            text[..idx].to_string()
        }
        None => text.to_string(),
    }
}

fn image_source(target: &str) -> String {
    let lower = target.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return target.to_string();
    }
    let path = Path::new(target);
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let display = absolute.to_string_lossy();
    format!("file:///{}", display.trim_start_matches('/'))
}
