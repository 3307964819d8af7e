//! Common utility functions used across Tether components

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

static LAST_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a unique, prefixed ID such as `agent-5f0c…`
pub fn generate_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// Current time as a fixed-width RFC3339 string, so stored timestamps sort lexically
pub fn now_rfc3339() -> String {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp, falling back to now for malformed rows
pub fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Strictly increasing insertion sequence, seeded from the wall clock in nanoseconds.
///
/// Two calls never return the same value within a process, even when the clock
/// does not advance between them.
pub fn next_sequence() -> u64 {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or_default().max(0) as u64;
    let mut last = LAST_SEQUENCE.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_SEQUENCE.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Split text into chunks of at most `max_words` words, preserving order
pub fn chunk_words(text: &str, max_words: usize) -> Vec<String> {
    let max_words = max_words.max(1);
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(max_words)
        .map(|chunk| chunk.join(" "))
        .collect()
}

/// Truncate string to specified length with ellipsis
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ids() {
        let id1 = generate_id("block");
        let id2 = generate_id("block");
        assert_ne!(id1, id2);
        assert!(id1.starts_with("block-"));
        assert_eq!(id1.len(), "block-".len() + 36);
    }

    #[test]
    fn test_sequence_is_strictly_increasing() {
        let mut prev = next_sequence();
        for _ in 0..1000 {
            let next = next_sequence();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let earlier = format_timestamp(parse_timestamp("2024-08-12T18:10:29.5Z"));
        let later = format_timestamp(parse_timestamp("2024-08-12T18:10:29.885208Z"));
        assert!(earlier < later);
        assert_eq!(earlier.len(), later.len());
    }

    #[test]
    fn test_chunk_words() {
        assert_eq!(chunk_words("I love chats", 300), vec!["I love chats"]);
        assert_eq!(chunk_words("a b c d e", 2), vec!["a b", "c d", "e"]);
        assert!(chunk_words("   ", 10).is_empty());
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("hi", 1), "...");
    }
}
