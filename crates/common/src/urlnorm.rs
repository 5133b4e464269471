//! URL normalization for comparison and de-duplication
//!
//! [`normalize_url`] produces a scheme-less canonical form: lowercase host
//! without `www.`, collapsed path without trailing slash, optional filtered
//! and sorted query, optional fragment. Path case is preserved since paths
//! are case-sensitive on most servers.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::{form_urlencoded, Host, Url};

use crate::error::{Error, Result};

/// Query parameters that only carry campaign/click tracking
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "mc_cid", "mc_eid", "_ga", "_gl", "igshid", "yclid",
    "ref_src",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    pub remove_www: bool,
    pub keep_query_params: bool,
    pub sort_query_params: bool,
    pub keep_fragment: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            remove_www: true,
            keep_query_params: false,
            sort_query_params: true,
            keep_fragment: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedUrl {
    pub hostname: String,
    /// Registrable domain (public suffix plus one label)
    pub domain: String,
    pub path: String,
    pub full: String,
    pub raw: String,
}

pub fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

fn has_scheme(input: &str) -> bool {
    match input.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

fn collapse_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        if ch == '/' && out.ends_with('/') {
            continue;
        }
        out.push(ch);
    }
    if out.is_empty() {
        out.push('/');
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Drop every `www` label, repeating until none is left to strip
fn strip_www(hostname: &str) -> String {
    let mut host = hostname.to_string();
    loop {
        let stripped = host.strip_prefix("www.").unwrap_or(&host).replace(".www.", ".");
        if stripped == host {
            return host;
        }
        host = stripped;
    }
}

/// Normalize `input` into its canonical comparable form
pub fn normalize_url(input: &str, options: &NormalizeOptions) -> Result<NormalizedUrl> {
    let raw = input.to_string();
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty URL".to_string()));
    }

    let with_scheme = if has_scheme(trimmed) {
        trimmed.to_string()
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&with_scheme).map_err(|e| Error::InvalidUrl(format!("{}: {}", trimmed, e)))?;

    let host = match parsed.host() {
        Some(Host::Domain(domain)) => domain.trim_end_matches('.').to_ascii_lowercase(),
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => {
            return Err(Error::InvalidUrl(format!("{}: IP address hosts are not supported", trimmed)))
        }
        None => return Err(Error::InvalidUrl(format!("{}: missing host", trimmed))),
    };

    let hostname = if options.remove_www { strip_www(&host) } else { host };

    let domain = psl::domain_str(&hostname)
        .ok_or_else(|| Error::InvalidUrl(format!("{}: no registrable domain", trimmed)))?
        .to_string();

    let path = collapse_path(parsed.path());

    let mut query = String::new();
    if options.keep_query_params {
        let mut pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        if options.sort_query_params {
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
        }
        if !pairs.is_empty() {
            let serialized = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            query = format!("?{}", serialized);
        }
    }

    let fragment = match parsed.fragment() {
        Some(fragment) if options.keep_fragment && !fragment.is_empty() => format!("#{}", fragment),
        _ => String::new(),
    };

    // The scheme is dropped, so both well-known ports are implied
    let port = parsed
        .port()
        .filter(|port| !matches!(port, 80 | 443))
        .map(|port| format!(":{}", port))
        .unwrap_or_default();
    let path_part = if path == "/" { "" } else { path.as_str() };
    let full = format!("{}{}{}{}{}", hostname, port, path_part, query, fragment);

    Ok(NormalizedUrl {
        hostname,
        domain,
        path,
        full,
        raw,
    })
}

/// Best-effort normalization for inputs [`normalize_url`] rejects.
///
/// This is lossy and not canonical: it only lowercases, strips the scheme,
/// a leading `www.`, query, fragment and trailing slashes. Two URLs that
/// compare equal here may still differ.
pub fn normalize_url_lossy(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let without_scheme = match lowered.split_once("://") {
        Some((_, rest)) => rest,
        None => lowered.as_str(),
    };
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
    let end = without_www.find(['?', '#']).unwrap_or(without_www.len());
    without_www[..end].trim_end_matches('/').to_string()
}

/// [`normalize_url`]'s `full` form, falling back to [`normalize_url_lossy`]
pub fn normalize_url_or_fallback(input: &str, options: &NormalizeOptions) -> String {
    match normalize_url(input, options) {
        Ok(normalized) => normalized.full,
        Err(e) => {
            debug!("Falling back to lossy URL normalization: {}", e);
            normalize_url_lossy(input)
        }
    }
}

/// Whether two URLs normalize to the same form
pub fn urls_equivalent(a: &str, b: &str, options: &NormalizeOptions) -> bool {
    normalize_url_or_fallback(a, options) == normalize_url_or_fallback(b, options)
}

/// Drop URLs whose normalized form was already seen, keeping the first
/// spelling of each
pub fn dedupe_urls<I, S>(urls: I, options: &NormalizeOptions) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(normalize_url_or_fallback(url.as_ref(), options)))
        .map(|url| url.as_ref().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn with_query() -> NormalizeOptions {
        NormalizeOptions {
            keep_query_params: true,
            ..Default::default()
        }
    }

    #[test]
    fn canonical_example() {
        let normalized = normalize_url("WWW.Example.COM/Path/?b=2&a=1#frag", &with_query()).unwrap();
        assert_eq!(normalized.full, "example.com/Path?a=1&b=2");
        assert_eq!(normalized.hostname, "example.com");
        assert_eq!(normalized.domain, "example.com");
        assert_eq!(normalized.path, "/Path");
        assert_eq!(normalized.raw, "WWW.Example.COM/Path/?b=2&a=1#frag");
    }

    #[test_case("https://example.com/", "example.com"; "root path is empty")]
    #[test_case("http://example.com//a///b/", "example.com/a/b"; "collapsed slashes")]
    #[test_case("https://blog.www.example.co.uk/x", "blog.example.co.uk/x"; "mid host www")]
    #[test_case("example.com?utm_source=x&q=1", "example.com"; "query dropped by default")]
    #[test_case("//example.com:8080/a", "example.com:8080/a"; "protocol relative with port")]
    fn defaults(input: &str, expected: &str) {
        assert_eq!(normalize_url(input, &NormalizeOptions::default()).unwrap().full, expected);
    }

    #[test]
    fn tracking_params_are_removed() {
        let normalized =
            normalize_url("https://example.com/a?utm_source=x&fbclid=1&z=2&a=b%20c", &with_query()).unwrap();
        assert_eq!(normalized.full, "example.com/a?a=b+c&z=2");
    }

    #[test]
    fn unsorted_query_keeps_order() {
        let options = NormalizeOptions {
            sort_query_params: false,
            ..with_query()
        };
        assert_eq!(normalize_url("example.com/?b=1&a=2", &options).unwrap().full, "example.com?b=1&a=2");
    }

    #[test]
    fn keeps_fragment_and_www_on_request() {
        let options = NormalizeOptions {
            remove_www: false,
            keep_fragment: true,
            ..Default::default()
        };
        let normalized = normalize_url("https://www.example.com/a#top", &options).unwrap();
        assert_eq!(normalized.full, "www.example.com/a#top");
        assert_eq!(normalized.domain, "example.com");
    }

    #[test_case(""; "empty")]
    #[test_case("   "; "blank")]
    #[test_case("http://127.0.0.1/a"; "ipv4")]
    #[test_case("http://[::1]/"; "ipv6")]
    #[test_case("https://co.uk"; "bare suffix")]
    #[test_case("https://exa mple.com"; "space in host")]
    fn rejects(input: &str) {
        assert!(normalize_url(input, &NormalizeOptions::default()).is_err());
    }

    #[test_case("www.www.example.com", "example.com")]
    #[test_case("a.www.www.b.com", "a.b.com")]
    #[test_case("www.example.www.co.uk", "example.co.uk")]
    #[test_case("wwwexample.com", "wwwexample.com")]
    fn strips_repeated_www(host: &str, expected: &str) {
        assert_eq!(strip_www(host), expected);
    }

    #[test_case("WWW.Example.COM/Path/?b=2&a=1#frag")]
    #[test_case("https://shop.example.com//cart/?utm_medium=x&id=%C3%A9&q=a+b")]
    #[test_case("http://www.example.org:8443/A/b/#x")]
    #[test_case("www.www.example.com/a")]
    #[test_case("https://a.www.www.b.com/")]
    fn idempotent(input: &str) {
        let with_fragment = NormalizeOptions {
            keep_fragment: true,
            ..with_query()
        };
        for options in [NormalizeOptions::default(), with_query(), with_fragment] {
            let once = normalize_url(input, &options).unwrap();
            let twice = normalize_url(&once.full, &options).unwrap();
            assert_eq!(once.full, twice.full);
        }
    }

    #[test]
    fn lossy_fallback() {
        assert_eq!(normalize_url_lossy("HTTP://WWW.Host.Local/Path/?q#f"), "host.local/path");
        assert_eq!(normalize_url_or_fallback("http://127.0.0.1/x/", &NormalizeOptions::default()), "127.0.0.1/x");
    }

    #[test]
    fn dedupe_keeps_first_spelling() {
        let urls = ["https://www.example.com/a/", "example.com/a", "example.com/b"];
        assert_eq!(
            dedupe_urls(urls, &NormalizeOptions::default()),
            vec!["https://www.example.com/a/", "example.com/b"]
        );
        assert!(urls_equivalent("example.com", "HTTPS://www.EXAMPLE.com/", &NormalizeOptions::default()));
    }
}
