// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text and URL normalization applied before fingerprinting.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Query parameters that only carry tracking information.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "mc_cid", "mc_eid", "igshid", "ref", "ref_src", "spm",
];

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Lowercase and collapse every whitespace run to one space.
pub fn collapse(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalize a title: strip configured prefixes (case-insensitive, repeatedly),
/// then lowercase and collapse whitespace.
pub fn normalize_title(title: &str, strip_prefixes: &[String]) -> String {
    let mut rest = title.trim();
    'strip: loop {
        for prefix in strip_prefixes.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            if let Some(head) = rest.get(..prefix.len())
                && head.eq_ignore_ascii_case(prefix)
            {
                rest = rest[prefix.len()..].trim_start();
                continue 'strip;
            }
        }
        break;
    }
    collapse(rest)
}

/// Normalize a description: drop HTML tags, lowercase, collapse whitespace.
pub fn normalize_body(body: &str) -> String {
    collapse(&HTML_TAG.replace_all(body, " "))
}

fn is_stripped_param(key: &str, extra: &[String]) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_")
        || TRACKING_PARAMS.contains(&key.as_str())
        || extra.iter().any(|p| p.eq_ignore_ascii_case(&key))
}

/// Normalize a URL for comparison.
///
/// Scheme and host are lowercased and default ports dropped (by the parser),
/// the fragment and tracking parameters are removed, remaining parameters
/// keep their order, and a trailing `/` is dropped from non-root paths.
/// Unparseable input falls back to [`collapse`].
pub fn normalize_url(raw: &str, strip_params: &[String]) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return collapse(trimmed);
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_stripped_param(key, strip_params))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed_path = path.trim_end_matches('/').to_string();
        url.set_path(&trimmed_path);
    }

    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(params: &[&str]) -> Vec<String> {
        params.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn title_is_lowercased_and_collapsed() {
        assert_eq!(
            normalize_title("  Rates   Rise\tAgain \n", &[]),
            "rates rise again"
        );
    }

    #[test]
    fn title_prefixes_are_stripped_repeatedly() {
        let prefixes = rules(&["BREAKING:", "[Update]"]);
        assert_eq!(
            normalize_title("breaking: [UPDATE] Bridge closed", &prefixes),
            "bridge closed"
        );
        // A prefix in the middle is left alone.
        assert_eq!(
            normalize_title("Markets BREAKING: records", &prefixes),
            "markets breaking: records"
        );
    }

    #[test]
    fn tracking_params_and_fragment_are_dropped() {
        let url = "HTTPS://News.Example.COM:443/world/story/?utm_source=x&id=7&fbclid=abc&page=2#top";
        assert_eq!(
            normalize_url(url, &[]),
            "https://news.example.com/world/story?id=7&page=2"
        );
    }

    #[test]
    fn feed_specific_params_are_dropped() {
        let url = "https://example.com/a?src=rss&id=1";
        assert_eq!(
            normalize_url(url, &rules(&["SRC"])),
            "https://example.com/a?id=1"
        );
    }

    #[test]
    fn root_path_keeps_its_slash() {
        assert_eq!(
            normalize_url("https://example.com/?ref=home", &[]),
            "https://example.com/"
        );
    }

    #[test]
    fn unparseable_url_falls_back_to_text() {
        assert_eq!(normalize_url("  Not A  URL ", &[]), "not a url");
    }

    #[test]
    fn body_drops_markup() {
        assert_eq!(
            normalize_body("<p>Hello <b>World</b></p>"),
            "hello world"
        );
    }
}
