pub mod browser_manager;
pub mod fallback;
pub mod html_text;
pub mod render;

pub use browser_manager::BrowserPool;
pub use fallback::{FallbackRenderer, ScraperApiFetcher};
pub use render::{ChromeRenderer, PageRenderer};

/// Cap on extracted page text, shared by the headless and proxy fetchers.
pub const MAX_TEXT_CHARS: usize = 200_000;

/// First `max` characters of `s` (char-boundary safe).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::truncate_chars;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
