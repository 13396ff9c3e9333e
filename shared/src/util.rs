/// Current UTC timestamp in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Truncate a string to at most `max` characters, respecting char boundaries.
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_multibyte_chars() {
        assert_eq!(truncate_chars("café au lait", 4), "café");
        assert_eq!(truncate_chars("tea", 10), "tea");
    }
}
