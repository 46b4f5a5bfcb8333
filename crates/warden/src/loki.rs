//! Loki range-query client.
//!
//! One HTTP surface: `query_range` over a nanosecond window, flattened into
//! [`LogEvent`]s sorted by numeric timestamp, plus the `/ready` probe the
//! healthcheck uses.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use incident::LogEvent;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Loki HTTP client.
#[derive(Debug, Clone)]
pub struct LokiClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct QueryRangeResponse {
    data: QueryRangeData,
}

#[derive(Debug, Deserialize)]
struct QueryRangeData {
    #[serde(default)]
    result: Vec<StreamResult>,
}

#[derive(Debug, Deserialize)]
struct StreamResult {
    #[serde(default)]
    stream: HashMap<String, String>,
    /// `[timestamp_ns, line]` pairs.
    #[serde(default)]
    values: Vec<(String, String)>,
}

impl LokiClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Range-query logs; returns events sorted by numeric timestamp.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-2xx reply.
    pub async fn query_range(
        &self,
        query: &str,
        limit: usize,
        start_ns: i128,
        end_ns: i128,
    ) -> Result<Vec<LogEvent>> {
        let url = format!("{}/loki/api/v1/query_range", self.base_url);
        debug!(%query, limit, "querying loki");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", query),
                ("limit", &limit.to_string()),
                ("start", &start_ns.to_string()),
                ("end", &end_ns.to_string()),
            ])
            .send()
            .await
            .context("loki request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("loki query_range returned {status}: {body}");
        }

        let parsed: QueryRangeResponse = response
            .json()
            .await
            .context("failed to parse loki response")?;

        let mut events: Vec<LogEvent> = parsed
            .data
            .result
            .into_iter()
            .flat_map(|stream| {
                let labels = stream.stream;
                stream.values.into_iter().map(move |(timestamp, message)| LogEvent {
                    timestamp,
                    message,
                    labels: labels.clone(),
                })
            })
            .collect();

        events.sort_by_key(LogEvent::timestamp_nanos);
        debug!(events = events.len(), "loki query complete");
        Ok(events)
    }

    /// `/ready` liveness probe.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-2xx reply.
    pub async fn ready(&self) -> Result<()> {
        let url = format!("{}/ready", self.base_url);
        let response = self.client.get(&url).send().await.context("loki unreachable")?;
        if !response.status().is_success() {
            bail!("loki /ready returned {}", response.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_query_range_flattens_and_sorts() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "data": {
                "result": [
                    {
                        "stream": {"app": "demo"},
                        "values": [["1000", "late"], ["999", "early"]]
                    },
                    {
                        "stream": {"app": "demo", "pod": "demo-1"},
                        "values": [["50", "earliest"]]
                    }
                ]
            }
        });
        Mock::given(method("GET"))
            .and(path("/loki/api/v1/query_range"))
            .and(query_param("query", "{app=\"demo\"}"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = LokiClient::new(server.uri());
        let events = client
            .query_range("{app=\"demo\"}", 100, 0, 2000)
            .await
            .unwrap();

        let messages: Vec<&str> = events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["earliest", "early", "late"]);
        assert_eq!(events[0].labels.get("pod").map(String::as_str), Some("demo-1"));
    }

    #[tokio::test]
    async fn test_query_range_surfaces_non_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loki/api/v1/query_range"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = LokiClient::new(server.uri());
        let error = client.query_range("{}", 10, 0, 1).await.unwrap_err();
        assert!(error.to_string().contains("500"));
    }
}
