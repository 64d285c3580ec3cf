use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    /// Byte range of the link inside the source text.
    pub range: Range<usize>,
}

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:https?://|www\.)[^\s<>]+").expect("link pattern is valid")
});

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '"', '\''];

/// Find URLs in message text. Bare `www.` links get an `https://` prefix.
pub fn extract_links(text: &str) -> Vec<Link> {
    LINK_PATTERN
        .find_iter(text)
        .filter_map(|m| {
            let matched = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
            if matched.is_empty() {
                return None;
            }
            let url = if matched.len() >= 4 && matched[..4].eq_ignore_ascii_case("www.") {
                format!("https://{}", matched)
            } else {
                matched.to_string()
            };
            Some(Link {
                url,
                range: m.start()..m.start() + matched.len(),
            })
        })
        .collect()
}
