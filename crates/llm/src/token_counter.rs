//! Advisory token estimation for echo mode.
//!
//! When there's no upstream, the proxy still has to report a `usage` block.
//! This is a rough `chars / 4` heuristic, not a real tokenizer — treat the
//! numbers it produces as advisory only.

/// Estimate a token count for `text`, rounding up and never returning zero
/// for non-empty input.
pub fn estimate(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }

    (text.chars().count() as u64).div_ceil(4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_tokens() {
        assert_eq!(estimate(""), 0);
    }

    #[test]
    fn short_text_rounds_up_to_at_least_one() {
        assert_eq!(estimate("hi"), 1);
    }

    #[test]
    fn rounds_up_to_the_next_multiple() {
        assert_eq!(estimate("12345"), 2);
        assert_eq!(estimate("12345678"), 2);
        assert_eq!(estimate("123456789"), 3);
    }
}
