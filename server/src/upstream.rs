//! HTTP upstream rate source.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use walletd_common::{Currency, RateTable};
use walletd_fx::{FxError, FxResult, RateSource};

/// Body of the upstream feed: `{"rates": {"USD": 1, "EUR": 0.92}}`.
#[derive(Debug, Deserialize)]
struct RatesFeed {
    rates: HashMap<Currency, Decimal>,
}

/// Fetches the full rate table with a GET of the configured URL.
pub struct HttpRateSource {
    client: reqwest::Client,
    url: String,
}

impl HttpRateSource {
    /// Create a source polling `url`, bounding each request by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> FxResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FxError::SourceUnavailable(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

fn unavailable(url: &str, err: reqwest::Error) -> FxError {
    warn!(url = %url, error = %err, "Rate feed request failed");
    FxError::SourceUnavailable(err.to_string())
}

#[async_trait]
impl RateSource for HttpRateSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_rates(&self) -> FxResult<RateTable> {
        let feed: RatesFeed = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| unavailable(&self.url, e))?
            .json()
            .await
            .map_err(|e| unavailable(&self.url, e))?;

        let table = RateTable::new(feed.rates)?;
        debug!(currencies = table.len(), "Fetched rate table");
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use rust_decimal_macros::dec;
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/rates")
    }

    #[tokio::test]
    async fn test_fetches_feed() {
        let url = serve(Router::new().route(
            "/rates",
            get(|| async { Json(json!({"rates": {"USD": 1, "eur": 0.92, "RUB": "92.5"}})) }),
        ))
        .await;

        let source = HttpRateSource::new(url, Duration::from_secs(2)).unwrap();
        let table = source.fetch_rates().await.unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.get(&Currency::eur()), Some(dec!(0.92)));
        assert_eq!(table.get(&Currency::rub()), Some(dec!(92.5)));
    }

    #[tokio::test]
    async fn test_error_status_is_unavailable() {
        let url = serve(Router::new().route(
            "/rates",
            get(|| async { StatusCode::BAD_GATEWAY }),
        ))
        .await;

        let source = HttpRateSource::new(url, Duration::from_secs(2)).unwrap();
        let err = source.fetch_rates().await.unwrap_err();
        assert!(matches!(err, FxError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_non_positive_rate_rejected() {
        let url = serve(Router::new().route(
            "/rates",
            get(|| async { Json(json!({"rates": {"USD": 1, "EUR": -0.5}})) }),
        ))
        .await;

        let source = HttpRateSource::new(url, Duration::from_secs(2)).unwrap();
        let err = source.fetch_rates().await.unwrap_err();
        assert!(matches!(err, FxError::InvalidRate(_)));
    }
}
