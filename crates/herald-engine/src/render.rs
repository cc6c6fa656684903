// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message template rendering.
//!
//! Supported placeholders: `{title}`, `{url}`, `{description}`,
//! `{published_at}`, `{feed_url}` and `{guid}`. Anything else in braces is
//! left as written.

use std::sync::LazyLock;

use herald_core::FeedItem;
use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

/// Renders `body` for `item`. Missing optional fields render empty.
pub fn render(body: &str, item: &FeedItem, feed_url: &str) -> String {
    PLACEHOLDER
        .replace_all(body, |caps: &Captures<'_>| match &caps[1] {
            "title" => item.title.clone(),
            "url" => item.url.clone(),
            "description" => item.description.clone().unwrap_or_default(),
            "published_at" => item
                .published_at
                .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_default(),
            "feed_url" => feed_url.to_string(),
            "guid" => item.guid.clone().unwrap_or_default(),
            _ => caps[0].to_string(),
        })
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item() -> FeedItem {
        FeedItem {
            id: "i1".into(),
            feed_id: "f1".into(),
            guid: Some("g-1".into()),
            title: "Rates held".into(),
            url: "https://news.example/rates".into(),
            description: None,
            normalized_title: "rates held".into(),
            normalized_url: "https://news.example/rates".into(),
            content_hash: "h".into(),
            published_at: Some(Utc.with_ymd_and_hms(2026, 5, 1, 7, 30, 0).unwrap()),
            created_at: Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn fills_known_placeholders() {
        let out = render(
            "*{title}*\n{url}\n{published_at} via {feed_url} ({guid})",
            &item(),
            "https://news.example/feed.json",
        );
        assert_eq!(
            out,
            "*Rates held*\nhttps://news.example/rates\n2026-05-01 07:30 UTC via https://news.example/feed.json (g-1)"
        );
    }

    #[test]
    fn unknown_placeholders_stay_verbatim() {
        let out = render("{title} {author} {}", &item(), "");
        assert_eq!(out, "Rates held {author} {}");
    }

    #[test]
    fn missing_description_renders_empty() {
        assert_eq!(render("{title}\n{description}", &item(), ""), "Rates held");
    }
}
