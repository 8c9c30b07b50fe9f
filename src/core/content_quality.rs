//! Bot-wall / thin-content heuristic applied to every rendered page.
//!
//! Pure function of `(text, title)`. Runs after the headless render and again
//! after the rendering-proxy fallback.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use std::sync::OnceLock;

/// Below this many characters a page that mentions a CAPTCHA is treated as a
/// challenge page rather than real content.
pub const MIN_CONTENT_CHARS: usize = 300;

/// Phrases that only show up on challenge / block interstitials. Any hit flags
/// the page regardless of length.
const STRONG_BOT_WALL_PHRASES: &[&str] = &[
    "attention required",
    "access denied",
    "access to this page has been denied",
    "cloudflare",
    "perimeterx",
    "unusual traffic",
    "verify you are human",
    "bot detected",
    "press and hold",
    "checking your browser before accessing",
];

/// CAPTCHA mentions that real pages also carry (login forms, footers), so they
/// only count on short pages.
const CAPTCHA_TERMS: &[&str] = &["captcha", "hcaptcha", "recaptcha", "are you a robot"];

static STRONG_MATCHER: OnceLock<Option<AhoCorasick>> = OnceLock::new();
static CAPTCHA_MATCHER: OnceLock<Option<AhoCorasick>> = OnceLock::new();

fn build_matcher(patterns: &[&str]) -> Option<AhoCorasick> {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .build(patterns)
        .ok()
}

fn strong_matcher() -> Option<&'static AhoCorasick> {
    STRONG_MATCHER
        .get_or_init(|| build_matcher(STRONG_BOT_WALL_PHRASES))
        .as_ref()
}

fn captcha_matcher() -> Option<&'static AhoCorasick> {
    CAPTCHA_MATCHER
        .get_or_init(|| build_matcher(CAPTCHA_TERMS))
        .as_ref()
}

/// Why a page was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSignal {
    /// A strong bot-wall phrase was found (the matched phrase).
    BotWall(&'static str),
    /// A CAPTCHA mention on a page shorter than [`MIN_CONTENT_CHARS`].
    ShortCaptcha,
}

fn find_strong(haystack: &str) -> Option<&'static str> {
    let m = strong_matcher()?.find(haystack)?;
    STRONG_BOT_WALL_PHRASES.get(m.pattern().as_usize()).copied()
}

fn mentions_captcha(haystack: &str) -> bool {
    captcha_matcher().is_some_and(|m| m.is_match(haystack))
}

/// Classify extracted page text and title. `None` means the page looks usable.
pub fn classify(text: &str, title: &str) -> Option<BlockSignal> {
    if let Some(phrase) = find_strong(title).or_else(|| find_strong(text)) {
        return Some(BlockSignal::BotWall(phrase));
    }

    let short = text.trim().chars().count() < MIN_CONTENT_CHARS;
    if short && (mentions_captcha(text) || mentions_captcha(title)) {
        return Some(BlockSignal::ShortCaptcha);
    }

    None
}

pub fn is_blocked(text: &str, title: &str) -> bool {
    classify(text, title).is_some()
}
