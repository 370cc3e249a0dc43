//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;
pub mod retry;

use regex::Regex;
use std::sync::OnceLock;

/// Maximum length of a stored slug
pub const MAX_SLUG_LEN: usize = 100;

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Truncate text to at most `max_chars` characters
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

/// Fold common Latin accented characters to their ASCII base letter
fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'ā' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'ē' | 'ę' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'ī' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' | 'ō' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'ū' => 'u',
        'ñ' | 'ń' => 'n',
        'ç' | 'ć' | 'č' => 'c',
        'ś' | 'š' => 's',
        'ź' | 'ż' | 'ž' => 'z',
        'ł' => 'l',
        'ý' | 'ÿ' => 'y',
        _ => c,
    }
}

/// Build a URL-safe slug: lowercase, accents folded, runs of anything that is not
/// `[a-z0-9]` collapsed into a single `-`, no leading or trailing dashes
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars().flat_map(char::to_lowercase).map(fold_accent) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Slug for a synced event: `{external_id}-{slugified title}`, capped at [`MAX_SLUG_LEN`]
pub fn event_slug(external_id: &str, title: &str) -> String {
    let base = slugify(title);
    let slug = if base.is_empty() {
        external_id.to_string()
    } else {
        format!("{external_id}-{base}")
    };

    slug.chars()
        .take(MAX_SLUG_LEN)
        .collect::<String>()
        .trim_end_matches('-')
        .to_string()
}

/// Decode the predefined XML entities and numeric character references
///
/// `&amp;` is decoded last so `&amp;lt;` stays the literal text `&lt;`. References
/// to invalid code points are left as written.
pub fn decode_xml_entities(text: &str) -> String {
    static CHAR_REF_RE: OnceLock<Regex> = OnceLock::new();

    let re = CHAR_REF_RE.get_or_init(|| {
        Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|([0-9]{1,7}));").expect("Invalid regex pattern")
    });

    let named = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'");

    re.replace_all(&named, |caps: &regex::Captures<'_>| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            (None, None) => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    })
    .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  hello   world  "), "hello world");
        assert_eq!(normalize_whitespace("hello\n\nworld"), "hello world");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("very long text here", 10), "very lo...");
        assert_eq!(truncate_text("ñññññññññññ", 5), "ññ...");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Test Night"), "test-night");
        assert_eq!(slugify("  Fábrica de Música!! "), "fabrica-de-musica");
        assert_eq!(slugify("B2B: DJ A & DJ B"), "b2b-dj-a-dj-b");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_event_slug() {
        assert_eq!(event_slug("ra-1", "Test Night"), "ra-1-test-night");
        assert_eq!(event_slug("42", "!!!"), "42");

        let long_title = "a ".repeat(200);
        let slug = event_slug("123", &long_title);
        assert!(slug.chars().count() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_decode_xml_entities() {
        assert_eq!(decode_xml_entities("Drum &amp; Bass"), "Drum & Bass");
        assert_eq!(decode_xml_entities("&lt;b&gt;"), "<b>");
        assert_eq!(decode_xml_entities("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_decode_numeric_references() {
        assert_eq!(decode_xml_entities("Rock &#39;n&#39; Roll"), "Rock 'n' Roll");
        assert_eq!(decode_xml_entities("Klock&#8217;s Night"), "Klock\u{2019}s Night");
        assert_eq!(decode_xml_entities("Caf&#xE9; &#X2013; Live"), "Caf\u{e9} \u{2013} Live");
        // Escaped reference stays literal; a surrogate is not a char
        assert_eq!(decode_xml_entities("&amp;#8217;"), "&#8217;");
        assert_eq!(decode_xml_entities("bad &#xD800; ref"), "bad &#xD800; ref");
    }
}
