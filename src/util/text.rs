use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Matches anything that looks like an HTML/XML tag, including unterminated
/// trailing tags.
static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>?").expect("tag pattern is valid"));

/// Matches runs of horizontal and vertical whitespace.
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Matches runs of spaces and tabs (newlines excluded).
static INLINE_WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("inline whitespace pattern is valid"));

/// Truncates a string to at most `max_bytes` bytes.
///
/// The cut is made on a byte budget, but never inside a multi-byte UTF-8
/// sequence: if `max_bytes` falls in the middle of a character, the result
/// ends just before that character.
///
/// # Examples
///
/// ```
/// use gfeed::util::truncate_bytes;
///
/// assert_eq!(truncate_bytes("hello", 3), "hel");
/// assert_eq!(truncate_bytes("héllo", 2), "h"); // 'é' is 2 bytes
/// assert_eq!(truncate_bytes("short", 100), "short");
/// ```
pub fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Upper-cases a leading ASCII letter, leaving the rest untouched.
///
/// Non-ASCII first characters are kept as they are (`"ßig"` stays `"ßig"`).
pub fn ucfirst(s: &str) -> Cow<'_, str> {
    match s.as_bytes().first() {
        Some(first) if first.is_ascii_lowercase() => {
            let mut out = String::with_capacity(s.len());
            out.push(first.to_ascii_uppercase() as char);
            out.push_str(&s[1..]);
            Cow::Owned(out)
        }
        _ => Cow::Borrowed(s),
    }
}

/// Removes the `pa_` prefix that the catalog puts on taxonomy-backed
/// attribute names (e.g. `pa_color` → `color`).
pub fn strip_attribute_prefix(attr: &str) -> &str {
    attr.strip_prefix("pa_").unwrap_or(attr)
}

/// Strips control characters, keeping tab, newline and carriage return.
///
/// Returns `Cow::Borrowed` when nothing needs stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_stripped = |c: char| c.is_control() && c != '\t' && c != '\n' && c != '\r';
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|&c| !is_stripped(c)).collect())
}

/// Cleans a single-line text value submitted through a form.
///
/// Tags are removed, control characters dropped, every whitespace run
/// (including line breaks) collapsed to one space, and the result trimmed.
pub fn sanitize_text_field(s: &str) -> String {
    let no_tags = TAG_PATTERN.replace_all(s, "");
    let clean = strip_control_chars(&no_tags);
    WHITESPACE_RUN.replace_all(&clean, " ").trim().to_string()
}

/// Like [`sanitize_text_field`] but preserves line breaks.
pub fn sanitize_textarea_field(s: &str) -> String {
    let no_tags = TAG_PATTERN.replace_all(s, "");
    let clean = strip_control_chars(&no_tags);
    let normalized = clean.replace("\r\n", "\n");
    let lines: Vec<String> = normalized
        .split('\n')
        .map(|line| INLINE_WHITESPACE_RUN.replace_all(line, " ").trim().to_string())
        .collect();
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_truncate_ascii() {
        assert_eq!(truncate_bytes("abcdef", 4), "abcd");
        assert_eq!(truncate_bytes("abcdef", 0), "");
        assert_eq!(truncate_bytes("abc", 3), "abc");
    }

    #[test]
    fn test_truncate_backs_off_multibyte() {
        // '€' is three bytes
        let s = "ab€cd";
        assert_eq!(truncate_bytes(s, 2), "ab");
        assert_eq!(truncate_bytes(s, 3), "ab");
        assert_eq!(truncate_bytes(s, 4), "ab");
        assert_eq!(truncate_bytes(s, 5), "ab€");
    }

    #[test]
    fn test_ucfirst() {
        assert_eq!(ucfirst("red"), "Red");
        assert_eq!(ucfirst("Red"), "Red");
        assert_eq!(ucfirst(""), "");
        assert_eq!(ucfirst("élan"), "élan");
        assert_eq!(ucfirst("ßig"), "ßig");
        assert_eq!(ucfirst("Large"), "Large");
        assert_eq!(ucfirst("xl tall"), "Xl tall");
    }

    #[test]
    fn test_strip_attribute_prefix() {
        assert_eq!(strip_attribute_prefix("pa_color"), "color");
        assert_eq!(strip_attribute_prefix("size"), "size");
        assert_eq!(strip_attribute_prefix("pa_"), "");
    }

    #[test]
    fn test_strip_control_chars() {
        assert!(matches!(strip_control_chars("clean"), Cow::Borrowed(_)));
        assert_eq!(strip_control_chars("a\x00b\x1bc\x7f"), "abc");
        assert_eq!(strip_control_chars("tab\there\nnl"), "tab\there\nnl");
    }

    #[test]
    fn test_sanitize_text_field() {
        assert_eq!(sanitize_text_field("  Acme   <b>Tools</b>  "), "Acme Tools");
        assert_eq!(sanitize_text_field("line\none"), "line one");
        assert_eq!(sanitize_text_field("<script>x</script>"), "x");
        assert_eq!(sanitize_text_field("trailing <unterminated"), "trailing");
    }

    #[test]
    fn test_sanitize_textarea_keeps_newlines() {
        assert_eq!(
            sanitize_textarea_field("First  line\r\n<i>second</i>\tline \n"),
            "First line\nsecond line"
        );
    }

    proptest! {
        #[test]
        fn truncate_never_exceeds_budget(s in "\\PC{0,64}", max in 0usize..80) {
            let out = truncate_bytes(&s, max);
            prop_assert!(out.len() <= max);
            prop_assert!(s.starts_with(out));
        }

        #[test]
        fn truncate_is_maximal(s in "\\PC{0,64}", max in 0usize..80) {
            let out = truncate_bytes(&s, max);
            if out.len() < s.len() {
                let next = s[out.len()..].chars().next().map(char::len_utf8).unwrap_or(0);
                prop_assert!(out.len() + next > max);
            }
        }

        #[test]
        fn sanitized_text_has_no_newlines(s in "\\PC{0,64}") {
            let out = sanitize_text_field(&s);
            prop_assert!(!out.contains('\n'));
            prop_assert_eq!(out.trim(), out.as_str());
        }
    }
}
