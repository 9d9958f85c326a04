//! Shared utility functions used across multiple modules.

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Trim a base URL and require an http(s) scheme.
pub fn normalize_base_url(raw: &str, name: &str) -> Result<String, String> {
    let base = raw.trim().trim_end_matches('/').to_string();
    if base.is_empty() {
        return Err(format!("{name} must not be empty"));
    }
    if !is_http_url(&base) {
        return Err(format!("{name} must include http:// or https://"));
    }
    Ok(base)
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Pull a human readable message out of an error response body.
///
/// Hosted services disagree on the field name, so `detail`, `message`,
/// `msg`, `error_description` and `error` are tried in that order.
pub fn error_detail(body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["detail", "message", "msg", "error_description", "error"] {
            if let Some(text) = map.get(field).and_then(serde_json::Value::as_str) {
                let text = text.trim();
                if !text.is_empty() {
                    return compact_text(text);
                }
            }
        }
    }
    let compacted = compact_text(body);
    if compacted.is_empty() {
        "no response body".to_string()
    } else {
        compacted
    }
}

/// Current Unix timestamp in seconds.
pub fn unix_timestamp_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" https://example.com ".to_string())),
            Some("https://example.com".to_string())
        );
    }

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url("", "API base URL").is_err());
        assert!(normalize_base_url("example.com", "API base URL").is_err());
        assert_eq!(
            normalize_base_url("https://api.example.com/", "API base URL").unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn error_detail_prefers_known_fields() {
        assert_eq!(error_detail(r#"{"detail":"Invalid audio file type"}"#), "Invalid audio file type");
        assert_eq!(error_detail(r#"{"message":"JWT expired"}"#), "JWT expired");
        assert_eq!(error_detail("plain failure"), "plain failure");
        assert_eq!(error_detail("  "), "no response body");
    }
}
