use super::util::with_retry;
use crate::core::config::UpstreamConfig;
use crate::core::{RateError, RateSource};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, instrument};

/// Scrapes the rate from the central bank's HTML page.
pub struct BcvRateSource {
    name: String,
    url: String,
    selector: Selector,
    selector_text: String,
    client: reqwest::Client,
    retries: usize,
    retry_delay: Duration,
}

impl BcvRateSource {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let selector = Selector::parse(&config.selector)
            .map_err(|e| anyhow!("Invalid selector '{}': {}", config.selector, e))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .context("Invalid Accept-Language header")?,
        );

        // The upstream rejects non-browser clients
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(BcvRateSource {
            name: config.name.clone(),
            url: config.url.clone(),
            selector,
            selector_text: config.selector.clone(),
            client,
            retries: config.retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    fn extract_rate_text(&self, body: &str) -> Result<String, RateError> {
        let document = Html::parse_document(body);
        let element = document.select(&self.selector).next().ok_or_else(|| {
            RateError::UpstreamUnavailable(format!(
                "No element matching '{}' in upstream page",
                self.selector_text
            ))
        })?;

        Ok(element.text().collect::<String>().trim().to_string())
    }
}

#[async_trait]
impl RateSource for BcvRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "UpstreamRateFetch", skip(self))]
    async fn fetch_raw_rate_text(&self) -> Result<String, RateError> {
        debug!(source = %self.name, url = %self.url, "Requesting rate page");

        let response = with_retry(
            || async { self.client.get(&self.url).send().await?.error_for_status() },
            self.retries,
            self.retry_delay,
        )
        .await
        .map_err(|e| {
            let reason = if e.is_timeout() {
                format!("request timed out: {e}")
            } else {
                e.to_string()
            };
            RateError::UpstreamUnavailable(reason)
        })?;

        let body = response.text().await.map_err(|e| {
            RateError::UpstreamUnavailable(format!("Failed to read response body: {e}"))
        })?;

        let text = self.extract_rate_text(&body)?;
        debug!(raw = %text, "Extracted rate text");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::tests::ManualClock;
    use crate::core::{DEFAULT_RATE, RateOutcome, RateProvider, RateProviderOptions};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    const RATE_PAGE: &str = r#"<html><body>
        <div id="euro"><strong> 40,12345678 </strong></div>
        <div id="dolar">
            <div class="field-content">
                <span>USD</span>
                <strong> 361,49060000 </strong>
            </div>
        </div>
    </body></html>"#;

    fn page_with_rate(rate: &str) -> String {
        format!(r#"<html><body><div id="dolar"><strong>{rate}</strong></div></body></html>"#)
    }

    async fn create_mock_server(status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;

        mock_server
    }

    fn config_for(mock_server: &MockServer) -> UpstreamConfig {
        UpstreamConfig {
            url: format!("{}/", mock_server.uri()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_raw_rate_text() {
        let mock_server = create_mock_server(200, RATE_PAGE).await;
        let source = BcvRateSource::new(&config_for(&mock_server)).unwrap();

        let text = source.fetch_raw_rate_text().await.unwrap();
        assert_eq!(text, "361,49060000");
        assert_eq!(source.parse_rate(&text).unwrap(), 361.4906);
        assert_eq!(source.name(), "BCV");
    }

    #[tokio::test]
    async fn test_sends_browser_headers() {
        let mock_server = MockServer::start().await;
        let config = config_for(&mock_server);

        let user_agent = config.user_agent.clone();
        let accept_language = config.accept_language.clone();

        // Both values contain commas, so compare the raw header instead of using `header`
        Mock::given(method("GET"))
            .and(move |request: &Request| {
                request.headers.get("user-agent").and_then(|v| v.to_str().ok())
                    == Some(user_agent.as_str())
            })
            .and(move |request: &Request| {
                request
                    .headers
                    .get("accept-language")
                    .and_then(|v| v.to_str().ok())
                    == Some(accept_language.as_str())
            })
            .respond_with(ResponseTemplate::new(200).set_body_string(page_with_rate("120,00")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let source = BcvRateSource::new(&config).unwrap();
        assert_eq!(source.fetch_raw_rate_text().await.unwrap(), "120,00");
    }

    #[tokio::test]
    async fn test_missing_element_is_upstream_unavailable() {
        let mock_server =
            create_mock_server(200, "<html><body><p>Mantenimiento</p></body></html>").await;
        let source = BcvRateSource::new(&config_for(&mock_server)).unwrap();

        let result = source.fetch_raw_rate_text().await;
        match result {
            Err(RateError::UpstreamUnavailable(reason)) => {
                assert_eq!(
                    reason,
                    "No element matching '#dolar strong' in upstream page"
                );
            }
            other => panic!("expected UpstreamUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_upstream_unavailable() {
        let mock_server = create_mock_server(503, RATE_PAGE).await;
        let source = BcvRateSource::new(&config_for(&mock_server)).unwrap();

        let result = source.fetch_raw_rate_text().await;
        assert!(matches!(result, Err(RateError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_upstream_unavailable() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(page_with_rate("120,00"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let config = UpstreamConfig {
            timeout_secs: 1,
            ..config_for(&mock_server)
        };
        let source = BcvRateSource::new(&config).unwrap();

        match source.fetch_raw_rate_text().await {
            Err(RateError::UpstreamUnavailable(reason)) => {
                assert!(reason.starts_with("request timed out"), "{reason}");
            }
            other => panic!("expected UpstreamUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_with_rate("99,50")))
            .mount(&mock_server)
            .await;

        let config = UpstreamConfig {
            retries: 1,
            retry_delay_ms: 10,
            ..config_for(&mock_server)
        };
        let source = BcvRateSource::new(&config).unwrap();

        assert_eq!(source.fetch_raw_rate_text().await.unwrap(), "99,50");
    }

    #[tokio::test]
    async fn test_unparsable_text_is_rejected() {
        let mock_server = create_mock_server(200, &page_with_rate("N/D")).await;
        let source = BcvRateSource::new(&config_for(&mock_server)).unwrap();

        let text = source.fetch_raw_rate_text().await.unwrap();
        assert!(matches!(
            source.parse_rate(&text),
            Err(RateError::UnparsableRate(_))
        ));
    }

    #[test]
    fn test_invalid_selector_fails_construction() {
        let config = UpstreamConfig {
            selector: "div[".to_string(),
            ..Default::default()
        };
        let result = BcvRateSource::new(&config);
        assert!(result.is_err());
        assert!(result.err().unwrap().to_string().contains("Invalid selector"));
    }

    #[tokio::test]
    async fn test_provider_end_to_end() {
        let mock_server = create_mock_server(200, &page_with_rate("120,00")).await;
        let source = Arc::new(BcvRateSource::new(&config_for(&mock_server)).unwrap());
        let clock = Arc::new(ManualClock::new());
        let provider = RateProvider::new(source, clock.clone(), RateProviderOptions::default());

        assert_eq!(provider.get_rate().await, 120.0);

        // Upstream goes away; unmatched requests now get a 404
        mock_server.reset().await;
        clock.advance(chrono::Duration::minutes(30));
        assert_eq!(provider.resolve().await, RateOutcome::Fresh(provider.cached().unwrap()));
        assert_eq!(provider.get_rate().await, 120.0);

        clock.advance(chrono::Duration::hours(2));
        let outcome = provider.resolve().await;
        assert!(matches!(outcome, RateOutcome::Stale(_)));
        assert_eq!(outcome.value(), 120.0);
    }

    #[tokio::test]
    async fn test_provider_cold_start_with_upstream_down() {
        let mock_server = create_mock_server(500, "").await;
        let source = Arc::new(BcvRateSource::new(&config_for(&mock_server)).unwrap());
        let provider = RateProvider::new(
            source,
            Arc::new(ManualClock::new()),
            RateProviderOptions::default(),
        );

        assert_eq!(provider.get_rate().await, DEFAULT_RATE);
    }
}
