//! Regex-based text extraction for raw HTML returned by the rendering proxy.

use super::{truncate_chars, MAX_TEXT_CHARS};
use regex::Regex;
use std::sync::OnceLock;

pub const MAX_TITLE_CHARS: usize = 300;

static TITLE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static SCRIPT_STYLE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static TAG_RE: OnceLock<Option<Regex>> = OnceLock::new();
static WS_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn title_re() -> Option<&'static Regex> {
    compiled(&TITLE_RE, r"(?is)<title[^>]*>(.*?)</title\s*>")
}

fn script_style_re() -> Option<&'static Regex> {
    // `regex` has no backreferences, so each block kind is listed.
    compiled(
        &SCRIPT_STYLE_RE,
        r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<noscript\b[^>]*>.*?</noscript\s*>|<!--.*?-->",
    )
}

fn tag_re() -> Option<&'static Regex> {
    compiled(&TAG_RE, r"(?s)<[^>]*>")
}

fn ws_re() -> Option<&'static Regex> {
    compiled(&WS_RE, r"\s+")
}

fn decode_basic_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(s: &str) -> String {
    match ws_re() {
        Some(re) => re.replace_all(s, " ").trim().to_string(),
        None => s.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

/// Text of the first `<title>` element, whitespace-collapsed, at most
/// [`MAX_TITLE_CHARS`] characters. Empty when there is none.
pub fn extract_title(html: &str) -> String {
    let Some(caps) = title_re().and_then(|re| re.captures(html)) else {
        return String::new();
    };
    let raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    truncate_chars(
        &collapse_whitespace(&decode_basic_entities(raw)),
        MAX_TITLE_CHARS,
    )
}

/// Visible-ish body text: script/style blocks dropped, all tags stripped,
/// whitespace collapsed, truncated to [`MAX_TEXT_CHARS`].
pub fn extract_text(html: &str) -> String {
    let without_blocks = match script_style_re() {
        Some(re) => re.replace_all(html, " ").into_owned(),
        None => html.to_string(),
    };
    let without_tags = match tag_re() {
        Some(re) => re.replace_all(&without_blocks, " ").into_owned(),
        None => without_blocks,
    };
    truncate_chars(
        &collapse_whitespace(&decode_basic_entities(&without_tags)),
        MAX_TEXT_CHARS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_uses_first_occurrence() {
        let html = "<html><head><title> Hello\n  World </title></head><body><svg><title>icon</title></svg></body></html>";
        assert_eq!(extract_title(html), "Hello World");
    }

    #[test]
    fn title_is_truncated() {
        let html = format!("<title>{}</title>", "a".repeat(1000));
        assert_eq!(extract_title(&html).chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn missing_title_is_empty() {
        assert_eq!(extract_title("<p>no title</p>"), "");
    }

    #[test]
    fn text_drops_scripts_styles_and_tags() {
        let html = r#"<html><head><style>body { color: red }</style>
            <script type="text/javascript">var captcha = "x";</script></head>
            <body><h1>Heading</h1><p>First&nbsp;para &amp; more</p>
            <!-- hidden comment --><div>Second</div></body></html>"#;
        assert_eq!(extract_text(html), "Heading First para & more Second");
    }

    #[test]
    fn text_is_truncated() {
        let html = format!("<p>{}</p>", "b".repeat(MAX_TEXT_CHARS + 10));
        assert_eq!(extract_text(&html).chars().count(), MAX_TEXT_CHARS);
    }
}
