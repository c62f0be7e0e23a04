use std::time::{Duration, Instant};

use async_trait::async_trait;
use firmscope_core::config::EnrichmentConfig;
use firmscope_core::{CompanyProfile, EnrichmentError, EnrichmentProvider, LookupTarget};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info, warn};

const ERROR_SNIPPET_CHARS: usize = 200;

#[derive(Clone, Debug)]
pub struct EnrichmentClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl EnrichmentClient {
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self, EnrichmentError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("firmscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| EnrichmentError::Transport(error.to_string()))?;

        Ok(Self::with_http_client(http, &config.base_url, config.api_key.clone()))
    }

    pub fn with_http_client(http: Client, base_url: &str, api_key: SecretString) -> Self {
        Self { http, base_url: base_url.trim().trim_end_matches('/').to_owned(), api_key }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn enrich_request(&self, target: &LookupTarget) -> RequestBuilder {
        let query = match target {
            LookupTarget::Website { url } => ("website", url.as_str()),
            LookupTarget::LinkedIn { company_id, .. } => ("linkedinID", company_id.as_str()),
        };

        self.http
            .get(format!("{}/company/enrich", self.base_url))
            .query(&[query])
            .bearer_auth(self.api_key.expose_secret())
    }
}

#[async_trait]
impl EnrichmentProvider for EnrichmentClient {
    async fn enrich(&self, target: &LookupTarget) -> Result<CompanyProfile, EnrichmentError> {
        let started = Instant::now();
        debug!(
            event_name = "egress.enrichment.request",
            target_kind = target.kind(),
            target = %target,
            "requesting company enrichment"
        );

        let response = self.enrich_request(target).send().await.map_err(map_transport_error)?;
        let status = response.status();
        let retry_after_secs = retry_after_secs(response.headers());
        let body = response.text().await.map_err(map_transport_error)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = interpret_response(status, retry_after_secs, &body);
        match &result {
            Ok(_) => info!(
                event_name = "egress.enrichment.completed",
                target_kind = target.kind(),
                target = %target,
                status = status.as_u16(),
                elapsed_ms,
                "company enrichment succeeded"
            ),
            Err(error) => warn!(
                event_name = "egress.enrichment.failed",
                target_kind = target.kind(),
                target = %target,
                status = status.as_u16(),
                elapsed_ms,
                error_class = error.class(),
                error = %error,
                "company enrichment failed"
            ),
        }
        result
    }
}

fn interpret_response(
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
) -> Result<CompanyProfile, EnrichmentError> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(EnrichmentError::Unauthorized)
        }
        StatusCode::NOT_FOUND => return Err(EnrichmentError::NotFound),
        StatusCode::TOO_MANY_REQUESTS => {
            return Err(EnrichmentError::RateLimited { retry_after_secs })
        }
        status if !status.is_success() => {
            return Err(EnrichmentError::Api { status: status.as_u16(), snippet: snippet(body) })
        }
        _ => {}
    }

    if body.trim().is_empty() {
        return Err(EnrichmentError::EmptyResponse);
    }

    serde_json::from_str::<Value>(body)
        .map(CompanyProfile::new)
        .map_err(|error| EnrichmentError::Decode(error.to_string()))
}

fn map_transport_error(error: reqwest::Error) -> EnrichmentError {
    if error.is_timeout() {
        EnrichmentError::Timeout
    } else {
        EnrichmentError::Transport(error.to_string())
    }
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()
}

fn snippet(body: &str) -> String {
    body.trim().chars().take(ERROR_SNIPPET_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use firmscope_core::{EnrichmentError, EnrichmentProvider, LookupTarget};
    use httpmock::prelude::*;
    use reqwest::StatusCode;
    use serde_json::json;

    use super::{interpret_response, EnrichmentClient};

    fn client_for(server: &MockServer) -> EnrichmentClient {
        EnrichmentClient::with_http_client(
            reqwest::Client::new(),
            &server.base_url(),
            "test-key".to_owned().into(),
        )
    }

    #[tokio::test]
    async fn website_lookup_sends_bearer_token_and_website_query() {
        let server = MockServer::start_async().await;
        let payload = json!({
            "id": "c-42",
            "name": "Acme",
            "industryList": ["Software"],
            "locationDetails": { "country": { "name": "United States" } }
        });
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/company/enrich")
                    .query_param("website", "https://acme.com")
                    .header("authorization", "Bearer test-key");
                then.status(200).json_body(payload.clone());
            })
            .await;

        let target = LookupTarget::parse("https://acme.com").expect("valid target");
        let profile = client_for(&server).enrich(&target).await.expect("enrichment succeeds");

        mock.assert_async().await;
        assert_eq!(profile.as_json(), &payload);
        assert_eq!(profile.display_name(), Some("Acme"));
    }

    #[tokio::test]
    async fn linkedin_lookup_sends_company_id() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/company/enrich").query_param("linkedinID", "openai");
                then.status(200).json_body(json!({ "name": "OpenAI" }));
            })
            .await;

        let target =
            LookupTarget::parse("https://www.linkedin.com/company/openai/").expect("valid target");
        let profile = client_for(&server).enrich(&target).await.expect("enrichment succeeds");

        mock.assert_async().await;
        assert_eq!(profile.display_name(), Some("OpenAI"));
    }

    #[tokio::test]
    async fn unauthorized_response_is_classified() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/company/enrich");
                then.status(401).body("{\"message\":\"bad key\"}");
            })
            .await;

        let target = LookupTarget::parse("acme.com").expect("valid target");
        let error = client_for(&server).enrich(&target).await.expect_err("should fail");

        assert_eq!(error, EnrichmentError::Unauthorized);
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/company/enrich");
                then.status(429).header("Retry-After", "17");
            })
            .await;

        let target = LookupTarget::parse("acme.com").expect("valid target");
        let error = client_for(&server).enrich(&target).await.expect_err("should fail");

        assert_eq!(error, EnrichmentError::RateLimited { retry_after_secs: Some(17) });
    }

    #[tokio::test]
    async fn slow_upstream_maps_to_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/company/enrich");
                then.status(200).delay(Duration::from_millis(500)).json_body(json!({}));
            })
            .await;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .expect("client builds");
        let client =
            EnrichmentClient::with_http_client(http, &server.base_url(), "k".to_owned().into());

        let target = LookupTarget::parse("acme.com").expect("valid target");
        let error = client.enrich(&target).await.expect_err("should time out");

        assert_eq!(error, EnrichmentError::Timeout);
    }

    #[tokio::test]
    async fn unreachable_host_maps_to_transport_error() {
        let client = EnrichmentClient::with_http_client(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            "k".to_owned().into(),
        );

        let target = LookupTarget::parse("acme.com").expect("valid target");
        let error = client.enrich(&target).await.expect_err("should fail");

        assert!(matches!(error, EnrichmentError::Transport(_)));
    }

    #[test]
    fn server_errors_keep_a_short_snippet() {
        let body = "x".repeat(500);
        let error = interpret_response(StatusCode::BAD_GATEWAY, None, &body).expect_err("error");

        match error {
            EnrichmentError::Api { status, snippet } => {
                assert_eq!(status, 502);
                assert_eq!(snippet.len(), 200);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_and_invalid_bodies_are_rejected() {
        assert_eq!(
            interpret_response(StatusCode::OK, None, "  \n"),
            Err(EnrichmentError::EmptyResponse)
        );
        assert!(matches!(
            interpret_response(StatusCode::OK, None, "<html>oops</html>"),
            Err(EnrichmentError::Decode(_))
        ));
    }

    #[test]
    fn decoded_body_pretty_prints_in_response_order() {
        let body = r#"{"name":"Acme","id":"c-1","totalFunding":123456789012345678901234,"URLs":[]}"#;
        let profile = interpret_response(StatusCode::OK, None, body).expect("profile decoded");

        let rendered = profile.to_pretty_json().expect("serializable");
        let keys: Vec<&str> = rendered
            .lines()
            .filter_map(|line| line.trim().strip_prefix('"'))
            .filter_map(|line| line.split('"').next())
            .collect();
        assert_eq!(keys, vec!["name", "id", "totalFunding", "URLs"]);
        assert!(rendered.contains("\"totalFunding\": 123456789012345678901234,"));
    }

    #[test]
    fn base_url_is_normalized() {
        let client = EnrichmentClient::with_http_client(
            reqwest::Client::new(),
            " https://data.example.test/ ",
            "k".to_owned().into(),
        );
        assert_eq!(client.base_url(), "https://data.example.test");
    }
}
