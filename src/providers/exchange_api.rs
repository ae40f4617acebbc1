use crate::core::error::{RateError, RateResult};
use crate::core::fetcher::RateFetcher;
use crate::core::rate::{CurrencyCode, RateTable};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Fetches `GET {base_url}/latest/{BASE}` from an exchange-rate API and
/// normalises the body into a [`RateTable`].
pub struct ExchangeApiFetcher {
    base_url: String,
    client: reqwest::Client,
}

impl ExchangeApiFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> RateResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent("fxrate/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| RateError::NetworkError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

/// Provider body. Both spellings seen in the wild are accepted for the success
/// flag (`success: true` or `result: "success"`) and for the rates mapping.
#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    success: Option<bool>,
    result: Option<String>,
    #[serde(alias = "conversion_rates")]
    rates: Option<HashMap<String, Value>>,
}

impl LatestRatesResponse {
    fn is_success(&self) -> bool {
        self.success == Some(true) || self.result.as_deref() == Some("success")
    }
}

fn normalize(base: &CurrencyCode, response: LatestRatesResponse) -> RateResult<RateTable> {
    if !response.is_success() {
        return Err(RateError::InvalidResponse(format!(
            "success indicator absent or false for base {base}"
        )));
    }
    let rates = response
        .rates
        .ok_or_else(|| RateError::InvalidResponse(format!("rates missing for base {base}")))?;
    if rates.is_empty() {
        return Err(RateError::InvalidResponse(format!(
            "rates empty for base {base}"
        )));
    }

    let mut table = RateTable::with_capacity(rates.len());
    for (code, value) in rates {
        let Ok(currency) = code.parse::<CurrencyCode>() else {
            warn!(base = %base, code = %code, "Skipping unparseable currency code");
            continue;
        };
        if &currency == base {
            continue;
        }
        match value.as_f64() {
            Some(rate) if rate.is_finite() && rate > 0.0 => {
                table.insert(currency, rate);
            }
            _ => warn!(base = %base, currency = %currency, value = %value, "Skipping invalid rate"),
        }
    }

    if table.is_empty() {
        return Err(RateError::InvalidResponse(format!(
            "no usable rates for base {base}"
        )));
    }
    Ok(table)
}

#[async_trait]
impl RateFetcher for ExchangeApiFetcher {
    #[instrument(name = "ExchangeApiFetch", skip_all, fields(base = %base))]
    async fn fetch(&self, base: &CurrencyCode) -> RateResult<RateTable> {
        let url = format!("{}/latest/{}", self.base_url, base);
        debug!("Requesting rates from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RateError::NetworkError(format!("Request error: {e} for base: {base}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(RateError::NetworkError(format!(
                "HTTP error: {status} for base: {base}"
            )));
        }
        if !status.is_success() {
            return Err(RateError::InvalidResponse(format!(
                "HTTP error: {status} for base: {base}"
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| RateError::NetworkError(format!("Failed to read body for {base}: {e}")))?;

        let data: LatestRatesResponse = serde_json::from_str(&text).map_err(|e| {
            RateError::InvalidResponse(format!("Failed to parse JSON response for {base}: {e}"))
        })?;

        let table = normalize(base, data)?;
        debug!(count = table.len(), "Fetched rates");
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn usd() -> CurrencyCode {
        "USD".parse().unwrap()
    }

    async fn create_mock_server(base: &str, template: ResponseTemplate) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/latest/{base}")))
            .respond_with(template)
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn fetcher(server: &MockServer) -> ExchangeApiFetcher {
        ExchangeApiFetcher::new(&server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_successful_fetch() {
        let body = r#"{"success": true, "base": "USD", "rates": {"EUR": 0.85, "UAH": 41.0, "USD": 1.0}}"#;
        let server = create_mock_server("USD", ResponseTemplate::new(200).set_body_string(body)).await;

        let table = fetcher(&server).fetch(&usd()).await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[&"EUR".parse::<CurrencyCode>().unwrap()], 0.85);
        assert_eq!(table[&"UAH".parse::<CurrencyCode>().unwrap()], 41.0);
    }

    #[tokio::test]
    async fn test_alternate_field_names() {
        let body = r#"{"result": "success", "conversion_rates": {"EUR": 0.9}}"#;
        let server = create_mock_server("USD", ResponseTemplate::new(200).set_body_string(body)).await;

        let table = fetcher(&server).fetch(&usd()).await.unwrap();
        assert_eq!(table[&"EUR".parse::<CurrencyCode>().unwrap()], 0.9);
    }

    #[tokio::test]
    async fn test_missing_success_flag_is_invalid() {
        let body = r#"{"rates": {"EUR": 0.85}}"#;
        let server = create_mock_server("USD", ResponseTemplate::new(200).set_body_string(body)).await;

        let result = fetcher(&server).fetch(&usd()).await;
        assert!(matches!(result, Err(RateError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_false_success_flag_is_invalid() {
        let body = r#"{"success": false, "rates": {"EUR": 0.85}}"#;
        let server = create_mock_server("USD", ResponseTemplate::new(200).set_body_string(body)).await;

        let result = fetcher(&server).fetch(&usd()).await;
        assert!(matches!(result, Err(RateError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_missing_or_empty_rates_is_invalid() {
        for body in [r#"{"success": true}"#, r#"{"success": true, "rates": {}}"#] {
            let server =
                create_mock_server("USD", ResponseTemplate::new(200).set_body_string(body)).await;
            let result = fetcher(&server).fetch(&usd()).await;
            assert!(
                matches!(result, Err(RateError::InvalidResponse(_))),
                "body {body} gave {result:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_non_positive_rates_are_dropped() {
        let body = r#"{"success": true, "rates": {"EUR": 0.85, "GBP": 0, "JPY": -3, "XAU": "n/a"}}"#;
        let server = create_mock_server("USD", ResponseTemplate::new(200).set_body_string(body)).await;

        let table = fetcher(&server).fetch(&usd()).await.unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.contains_key(&"EUR".parse::<CurrencyCode>().unwrap()));

        let body = r#"{"success": true, "rates": {"GBP": 0}}"#;
        let server = create_mock_server("USD", ResponseTemplate::new(200).set_body_string(body)).await;
        let result = fetcher(&server).fetch(&usd()).await;
        assert!(matches!(result, Err(RateError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_malformed_json_is_invalid() {
        let server =
            create_mock_server("USD", ResponseTemplate::new(200).set_body_string("<html>")).await;

        let result = fetcher(&server).fetch(&usd()).await;
        match result {
            Err(RateError::InvalidResponse(msg)) => {
                assert!(msg.contains("Failed to parse JSON response for USD"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_network_error() {
        let server = create_mock_server("USD", ResponseTemplate::new(503)).await;

        let result = fetcher(&server).fetch(&usd()).await;
        assert!(matches!(result, Err(RateError::NetworkError(_))));
    }

    #[tokio::test]
    async fn test_client_error_is_invalid_response() {
        let server = create_mock_server("USD", ResponseTemplate::new(404)).await;

        let result = fetcher(&server).fetch(&usd()).await;
        assert!(matches!(result, Err(RateError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_network_error() {
        let body = r#"{"success": true, "rates": {"EUR": 0.85}}"#;
        let server = create_mock_server(
            "USD",
            ResponseTemplate::new(200)
                .set_body_string(body)
                .set_delay(Duration::from_millis(500)),
        )
        .await;

        let fetcher = ExchangeApiFetcher::new(&server.uri(), Duration::from_millis(100)).unwrap();
        let result = fetcher.fetch(&usd()).await;
        assert!(matches!(result, Err(RateError::NetworkError(_))));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_network_error() {
        let fetcher = ExchangeApiFetcher::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let result = fetcher.fetch(&usd()).await;
        assert!(matches!(result, Err(RateError::NetworkError(_))));
    }
}
