use serde::{Deserialize, Serialize};

use super::item::ItemId;

/// A stored comment on an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub comment_id: i64,
    pub item_id: ItemId,
    pub content: String,
    pub author: String,
    pub created_at_ms: i64,
}

/// Validate and normalize comment content.
///
/// Returns the trimmed content.
///
/// # Errors
///
/// Returns a human-readable reason when the content is empty, longer than
/// `max_chars`, or carries control characters other than newline and tab.
pub fn validate_content(raw: &str, max_chars: usize) -> Result<String, String> {
    let content = raw.trim();
    if content.is_empty() {
        return Err("comment content must not be empty".to_string());
    }

    let chars = content.chars().count();
    if chars > max_chars {
        return Err(format!(
            "comment content must be <= {max_chars} characters (got {chars})"
        ));
    }

    if content
        .chars()
        .any(|ch| ch.is_control() && ch != '\n' && ch != '\t')
    {
        return Err("comment content must not contain control characters".to_string());
    }

    Ok(content.to_string())
}

/// Coarse relative age: `just now`, `5m ago`, `3h ago`, `2d ago`.
#[must_use]
pub fn time_ago(created_at_ms: i64, now_ms: i64) -> String {
    let seconds = now_ms.saturating_sub(created_at_ms).max(0) / 1_000;
    match seconds {
        0..60 => "just now".to_string(),
        60..3_600 => format!("{}m ago", seconds / 60),
        3_600..86_400 => format!("{}h ago", seconds / 3_600),
        _ => format!("{}d ago", seconds / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::{time_ago, validate_content};

    #[test]
    fn trims_and_accepts_normal_content() {
        assert_eq!(validate_content("  hello\n", 10).as_deref(), Ok("hello"));
    }

    #[test]
    fn rejects_blank_long_and_control_content() {
        assert!(validate_content("   ", 10).is_err());
        assert!(validate_content("abcdefghijk", 10).is_err());
        assert!(validate_content("bell\u{7}", 10).is_err());
        assert!(validate_content("tab\tok", 10).is_ok());
    }

    #[test]
    fn length_limit_counts_chars_not_bytes() {
        assert!(validate_content("ééééé", 5).is_ok());
    }

    #[test]
    fn time_ago_buckets() {
        assert_eq!(time_ago(0, 59_000), "just now");
        assert_eq!(time_ago(0, 5 * 60_000), "5m ago");
        assert_eq!(time_ago(0, 3 * 3_600_000), "3h ago");
        assert_eq!(time_ago(0, 2 * 86_400_000), "2d ago");
        assert_eq!(time_ago(10_000, 0), "just now");
    }
}
