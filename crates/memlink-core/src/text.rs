//! UTF-8–safe text utilities.
//!
//! Limits throughout memlink are expressed in characters, not bytes, so these
//! helpers count `char`s and never split a multi-byte character.

/// Truncate a string to at most `max_chars` characters.
///
/// Returns a borrowed prefix; no allocation happens.
#[inline]
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// Truncate `s` to `max_chars` characters and append `suffix` if anything was cut.
///
/// The result is at most `max_chars + suffix.chars().count()` characters long.
/// If the string fits, it is returned unchanged.
pub fn truncate_with_suffix(s: &str, max_chars: usize, suffix: &str) -> String {
    let prefix = truncate_chars(s, max_chars);
    if prefix.len() == s.len() {
        return s.to_owned();
    }
    format!("{prefix}{suffix}")
}

/// Collapse every run of whitespace (including newlines) into a single space
/// and trim both ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase ASCII slug: alphanumerics kept, everything else becomes `-`,
/// runs of `-` collapsed, leading/trailing `-` removed, at most `max_chars`.
pub fn slugify(s: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max_chars));
    let mut last_dash = true;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let truncated = truncate_chars(&out, max_chars);
    truncated.trim_matches('-').to_owned()
}

/// Escape the five XML-sensitive characters (`& < > " '`).
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
