//! API route configuration.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use walletd_ledger::TransactionalStore;

use crate::handlers;
use crate::state::AppState;

/// Creates the API router with all routes configured.
pub fn create_router<S: TransactionalStore>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Rates
        .route("/api/v1/exchange/rates", get(handlers::get_rates::<S>))
        // Wallets
        .route(
            "/api/v1/accounts/:account/balance",
            get(handlers::get_balance::<S>),
        )
        .route(
            "/api/v1/accounts/:account/wallet/deposit",
            post(handlers::deposit::<S>),
        )
        .route(
            "/api/v1/accounts/:account/wallet/withdraw",
            post(handlers::withdraw::<S>),
        )
        .route(
            "/api/v1/accounts/:account/exchange",
            post(handlers::exchange::<S>),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;
    use walletd_fx::{FixedRateSource, RateResolver, ResolverConfig};
    use walletd_ledger::{MemoryStore, WalletLedger};

    async fn test_app() -> Router {
        let source = Arc::new(FixedRateSource::new([
            ("USD", dec!(1)),
            ("EUR", dec!(0.9)),
        ]));
        let config = ResolverConfig {
            retry_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let resolver = RateResolver::new(source, config).await.unwrap();
        let ledger = WalletLedger::new(MemoryStore::new(), Arc::new(resolver));
        create_router(Arc::new(AppState::new(ledger)))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn amount(value: &Value) -> rust_decimal::Decimal {
        value.as_str().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app().await;

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_rates() {
        let app = test_app().await;

        let (status, body) = send(&app, "GET", "/api/v1/exchange/rates", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(amount(&body["rates"]["EUR"]), dec!(0.9));
        assert_eq!(amount(&body["rates"]["USD"]), dec!(1));
    }

    #[tokio::test]
    async fn test_deposit_and_balance() {
        let app = test_app().await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/accounts/alice@example.com/wallet/deposit",
            Some(json!({"amount": 100, "currency": "usd"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Account topped up successfully");
        assert_eq!(amount(&body["new_balance"]["USD"]), dec!(100));

        let (status, body) = send(
            &app,
            "GET",
            "/api/v1/accounts/Alice@Example.com/balance",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(amount(&body["balance"]["USD"]), dec!(100));
    }

    #[tokio::test]
    async fn test_exchange() {
        let app = test_app().await;
        send(
            &app,
            "POST",
            "/api/v1/accounts/alice@example.com/wallet/deposit",
            Some(json!({"amount": "50", "currency": "USD"})),
        )
        .await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/accounts/alice@example.com/exchange",
            Some(json!({"from_currency": "USD", "to_currency": "EUR", "amount": 10})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(amount(&body["exchanged_amount"]), dec!(9));
        assert_eq!(amount(&body["rate"]), dec!(0.9));
        assert_eq!(amount(&body["new_balance"]["USD"]), dec!(40));
        assert_eq!(amount(&body["new_balance"]["EUR"]), dec!(9));
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let app = test_app().await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/accounts/alice@example.com/wallet/withdraw",
            Some(json!({"amount": 5, "currency": "USD"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INSUFFICIENT_BALANCE");

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/accounts/alice@example.com/wallet/deposit",
            Some(json!({"amount": 0, "currency": "USD"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "ZERO_AMOUNT");

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/accounts/alice@example.com/wallet/deposit",
            Some(json!({"amount": 1, "currency": "XYZ"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "NON_EXISTENT_CURRENCY");

        let (status, body) = send(
            &app,
            "GET",
            "/api/v1/accounts/not-an-email/balance",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_ACCOUNT");
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let app = test_app().await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/accounts/alice@example.com/wallet/deposit",
            Some(json!({"currency": "USD"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_unresolvable_exchange() {
        let app = test_app().await;
        send(
            &app,
            "POST",
            "/api/v1/accounts/alice@example.com/wallet/deposit",
            Some(json!({"amount": 5, "currency": "USD"})),
        )
        .await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/accounts/alice@example.com/exchange",
            Some(json!({"from_currency": "USD", "to_currency": "XYZ", "amount": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "RATE_RESOLUTION_FAILED");
    }
}
