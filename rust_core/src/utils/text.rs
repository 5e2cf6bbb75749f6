//! Helpers for putting untrusted response bodies into error messages.

/// Error bodies are cut to this many bytes before being logged
pub const MAX_ERROR_BODY: usize = 256;

/// Truncate `body` to at most `max` bytes on a char boundary.
pub fn truncate_body(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut idx = max;
        while !body.is_char_boundary(idx) {
            idx -= 1;
        }
        body.truncate(idx);
        body.push_str("...");
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("abc".to_string(), 10), "abc");
        assert_eq!(truncate_body("abcdef".to_string(), 4), "abcd...");
        // 'é' is two bytes starting at index 1
        assert_eq!(truncate_body("aéb".to_string(), 2), "a...");
    }
}
