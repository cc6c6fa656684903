// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP feed source for JSON Feed documents (`version` + `items[]`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::{Feed, FeedSource, HeraldError, RawItem};
use serde::Deserialize;
use tracing::debug;

const USER_AGENT: &str = concat!("herald/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct JsonFeed {
    #[serde(default)]
    items: Vec<JsonFeedItem>,
}

#[derive(Debug, Deserialize)]
struct JsonFeedItem {
    id: Option<String>,
    url: Option<String>,
    external_url: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    content_text: Option<String>,
    date_published: Option<String>,
}

impl JsonFeedItem {
    fn into_raw(self) -> Option<RawItem> {
        let url = self.url.or(self.external_url).unwrap_or_default();
        let title = self.title.unwrap_or_default();
        if url.is_empty() && title.is_empty() {
            return None;
        }
        Some(RawItem {
            guid: self.id,
            title,
            url,
            description: self.summary.or(self.content_text),
            published_at: self
                .date_published
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc)),
        })
    }
}

fn feed_error(message: String, source: Option<reqwest::Error>) -> HeraldError {
    HeraldError::Feed {
        message,
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    }
}

pub struct JsonFeedSource {
    client: reqwest::Client,
}

impl JsonFeedSource {
    pub fn new(request_timeout: Duration) -> Result<Self, HeraldError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| HeraldError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for JsonFeedSource {
    async fn fetch_candidates(&self, feed: &Feed) -> Result<Vec<RawItem>, HeraldError> {
        if feed.feed_type != "json" {
            return Err(feed_error(
                format!("unsupported feed type `{}`", feed.feed_type),
                None,
            ));
        }

        let response = self
            .client
            .get(&feed.url)
            .send()
            .await
            .map_err(|e| feed_error(format!("request failed: {e}"), Some(e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(feed_error(format!("feed returned {status}"), None));
        }

        let document: JsonFeed = response
            .json()
            .await
            .map_err(|e| feed_error(format!("malformed JSON feed: {e}"), Some(e)))?;
        let total = document.items.len();
        let items: Vec<RawItem> = document
            .items
            .into_iter()
            .filter_map(JsonFeedItem::into_raw)
            .collect();
        debug!(
            feed = feed.id.as_str(),
            total,
            usable = items.len(),
            "json feed parsed"
        );
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::CleaningRules;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn feed(url: String) -> Feed {
        Feed {
            id: "wire".into(),
            url,
            feed_type: "json".into(),
            enabled: true,
            fetch_interval_minutes: 5,
            last_fetched_at: None,
            parse_config: None,
            cleaning_rules: CleaningRules::default(),
        }
    }

    fn source() -> JsonFeedSource {
        JsonFeedSource::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn parses_json_feed_items() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "version": "https://jsonfeed.org/version/1.1",
            "title": "Wire",
            "items": [
                {
                    "id": "a-1",
                    "url": "https://wire.example/a",
                    "title": "Rates held",
                    "summary": "The bank kept rates unchanged.",
                    "date_published": "2026-05-01T08:30:00+02:00"
                },
                {
                    "id": "b-2",
                    "external_url": "https://elsewhere.example/b",
                    "title": "Linked story",
                    "content_text": "Body text"
                },
                { "id": "empty" }
            ]
        });
        Mock::given(method("GET"))
            .and(path("/feed.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let items = source()
            .fetch_candidates(&feed(format!("{}/feed.json", server.uri())))
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].guid.as_deref(), Some("a-1"));
        assert_eq!(items[0].description.as_deref(), Some("The bank kept rates unchanged."));
        assert_eq!(
            items[0].published_at.unwrap().to_rfc3339(),
            "2026-05-01T06:30:00+00:00"
        );
        assert_eq!(items[1].url, "https://elsewhere.example/b");
        assert_eq!(items[1].description.as_deref(), Some("Body text"));
    }

    #[tokio::test]
    async fn server_errors_are_feed_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = source()
            .fetch_candidates(&feed(format!("{}/feed.json", server.uri())))
            .await
            .unwrap_err();
        assert!(matches!(err, HeraldError::Feed { .. }));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn malformed_documents_are_feed_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<rss></rss>"))
            .mount(&server)
            .await;

        let err = source()
            .fetch_candidates(&feed(format!("{}/feed.json", server.uri())))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("malformed JSON feed"));
    }

    #[tokio::test]
    async fn other_feed_types_are_rejected() {
        let mut rss = feed("https://wire.example/rss".into());
        rss.feed_type = "rss".into();
        let err = source().fetch_candidates(&rss).await.unwrap_err();
        assert!(err.to_string().contains("unsupported feed type `rss`"));
    }
}
