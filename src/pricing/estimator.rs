use crate::constants::CHARS_PER_UNIT;

/// Estimate usage units for `text`: `ceil(chars / 4)`.
///
/// Total over all strings. Returns 0 only for the empty string, so a priced
/// request is never recorded as free. This is a heuristic, not a tokenizer,
/// and deliberately independent of any provider.
#[inline]
pub fn estimate(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    chars.div_ceil(CHARS_PER_UNIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_free() {
        assert_eq!(estimate(""), 0);
    }

    #[test]
    fn test_non_empty_is_at_least_one() {
        assert_eq!(estimate("a"), 1);
        assert_eq!(estimate(" "), 1);
        assert_eq!(estimate("abcd"), 1);
        assert_eq!(estimate("abcde"), 2);
        assert_eq!(estimate("hello"), 2);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // Four two-byte characters
        assert_eq!(estimate("éééé"), 1);
        assert_eq!(estimate("日本語テキスト"), 2);
    }

    #[test]
    fn test_monotonic_in_length() {
        let mut text = String::new();
        let mut previous = estimate(&text);
        for _ in 0..64 {
            text.push('x');
            let current = estimate(&text);
            assert!(current >= previous);
            assert!(current >= 1);
            previous = current;
        }
        assert_eq!(previous, 16);
    }
}
