use url::Url;

/// Input is not an absolute http/https URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrongFormat;

/// Validate `raw` as an absolute http/https URL and return its canonical form.
pub fn normalize_url(raw: &str) -> Result<String, WrongFormat> {
    let parsed = Url::parse(raw.trim()).map_err(|_| WrongFormat)?;
    match parsed.scheme() {
        "http" | "https" => {}
        _ => return Err(WrongFormat),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(WrongFormat);
    }
    Ok(parsed.to_string())
}

/// Bare host of an already-normalized URL (no scheme, no port).
pub fn extract_host(normalized: &str) -> Result<String, WrongFormat> {
    let parsed = Url::parse(normalized).map_err(|_| WrongFormat)?;
    parsed
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .filter(|h| !h.is_empty())
        .ok_or(WrongFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_absolute_input() {
        assert_eq!(normalize_url("foobar"), Err(WrongFormat));
        assert_eq!(normalize_url("example.com/path"), Err(WrongFormat));
        assert_eq!(normalize_url(""), Err(WrongFormat));
    }

    #[test]
    fn rejects_other_schemes() {
        assert_eq!(normalize_url("ftp://example.com"), Err(WrongFormat));
        assert_eq!(normalize_url("mailto:someone@example.com"), Err(WrongFormat));
        assert_eq!(normalize_url("javascript:alert(1)"), Err(WrongFormat));
    }

    #[test]
    fn canonicalizes_accepted_urls() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM").as_deref(),
            Ok("https://example.com/")
        );
        assert_eq!(
            normalize_url("  http://example.com/a b?q=1 ").as_deref(),
            Ok("http://example.com/a%20b?q=1")
        );
    }

    #[test]
    fn host_is_bare() {
        assert_eq!(
            extract_host("https://sub.example.com:8443/x?y=1").as_deref(),
            Ok("sub.example.com")
        );
        assert_eq!(extract_host("http://[::1]/").as_deref(), Ok("::1"));
        assert_eq!(extract_host("not a url"), Err(WrongFormat));
    }
}
