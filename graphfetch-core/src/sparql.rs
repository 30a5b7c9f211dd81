//! SPARQL endpoint client.
//!
//! The HTTP session is an explicitly constructed [`SparqlClient`] that the
//! caller owns and hands to the fetcher; nothing here is process-global.

use crate::config::EndpointConfig;
use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// One term bound to a variable in a result row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingValue {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(rename = "xml:lang", default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

/// A result row: variable name to bound term.
pub type Binding = HashMap<String, BindingValue>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultHead {
    #[serde(default)]
    pub vars: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

/// The `application/sparql-results+json` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparqlResponse {
    #[serde(default)]
    pub head: ResultHead,
    pub results: ResultSet,
}

impl SparqlResponse {
    pub fn bindings(&self) -> &[Binding] {
        &self.results.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.results.bindings.is_empty()
    }
}

/// Executes a single query against some endpoint.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &str) -> Result<SparqlResponse, FetchError>;

    /// Where queries go, for log lines.
    fn endpoint(&self) -> &str;
}

/// HTTP client for a SPARQL 1.1 query endpoint.
#[derive(Debug, Clone)]
pub struct SparqlClient {
    client: Client,
    endpoint: String,
}

impl SparqlClient {
    /// Build a client with the configured user agent and per-request timeout.
    pub fn new(config: &EndpointConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Transport {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self::with_client(client, config.url.clone()))
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

/// Keep error bodies short enough for a log line.
fn truncate_body(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

#[async_trait]
impl QueryExecutor for SparqlClient {
    async fn execute(&self, query: &str) -> Result<SparqlResponse, FetchError> {
        debug!(endpoint = %self.endpoint, bytes = query.len(), "Sending SPARQL query");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("query", query), ("format", "json")])
            .header(
                reqwest::header::ACCEPT,
                "application/sparql-results+json, application/json",
            )
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: truncate_body(body, 512),
            });
        }

        serde_json::from_str(&body).map_err(|e| FetchError::Protocol {
            message: format!("Invalid SPARQL JSON: {e}"),
        })
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TWO_ROWS: &str = r#"{
        "head": {"vars": ["item", "label"]},
        "results": {"bindings": [
            {"item": {"type": "uri", "value": "http://www.wikidata.org/entity/Q12418"},
             "label": {"type": "literal", "value": "Mona Lisa", "xml:lang": "en"}},
            {"item": {"type": "uri", "value": "http://www.wikidata.org/entity/Q45585"}}
        ]}
    }"#;

    fn client_for(server: &MockServer) -> SparqlClient {
        SparqlClient::with_client(Client::new(), format!("{}/sparql", server.uri()))
    }

    #[tokio::test]
    async fn test_execute_parses_bindings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sparql"))
            .and(query_param("query", "SELECT ?item WHERE { }"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TWO_ROWS))
            .mount(&server)
            .await;

        let response = client_for(&server)
            .execute("SELECT ?item WHERE { }")
            .await
            .unwrap();

        assert_eq!(response.head.vars, vec!["item", "label"]);
        assert_eq!(response.bindings().len(), 2);
        let label = &response.bindings()[0]["label"];
        assert_eq!(label.value, "Mona Lisa");
        assert_eq!(label.lang.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_execute_sends_configured_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "graphfetch-test/1.0"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"results": {"bindings": []}}"#),
            )
            .mount(&server)
            .await;

        let config = EndpointConfig {
            url: format!("{}/sparql", server.uri()),
            user_agent: "graphfetch-test/1.0".into(),
            timeout_secs: 5,
        };
        let response = SparqlClient::new(&config)
            .unwrap()
            .execute("ASK {}")
            .await
            .unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn test_execute_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client_for(&server).execute("ASK {}").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 429, ref body } if body == "slow down"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_execute_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).execute("ASK {}").await.unwrap_err();
        assert!(matches!(err, FetchError::Protocol { .. }));
    }

    #[test]
    fn test_truncate_body_respects_char_boundary() {
        let body = "é".repeat(10);
        assert_eq!(truncate_body(body, 5), "éé");
        assert_eq!(truncate_body("short".into(), 512), "short");
    }

    #[tokio::test]
    async fn test_execute_connection_refused() {
        let client = SparqlClient::with_client(Client::new(), "http://127.0.0.1:9/sparql");
        let err = client.execute("ASK {}").await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }
}
