use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::models::PaymentMethod;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("charge declined: {0}")]
    Declined(String),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// What the buyer pays with.
#[derive(Debug, Clone)]
pub enum PaymentSource {
    /// Opaque token minted by the gateway's client-side library.
    Token(String),
    /// Card stored on the buyer's account.
    StoredCard(PaymentMethod),
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub source: Option<PaymentSource>,
    /// Sent as `Idempotency-Key` so a retried or timed-out charge maps to one gateway charge.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: ChargeRequest) -> Result<Charge, PaymentError>;

    async fn refund(&self, charge_id: &str) -> Result<(), PaymentError>;
}

/// Pick the gateway once at startup.
pub fn from_config(config: &Config) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    if config.use_stripe {
        let secret_key = config
            .stripe_secret_key
            .clone()
            .context("STRIPE_SECRET_KEY is required for live payments")?;
        tracing::info!("Stripe integration ON");
        Ok(Arc::new(LiveGateway::new(config.stripe_api_url.clone(), secret_key)?))
    } else {
        tracing::info!("Stripe integration OFF, using mock payments");
        Ok(Arc::new(MockGateway::new()))
    }
}

/// Charges through the Stripe REST API.
pub struct LiveGateway {
    client: reqwest::Client,
    api_url: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct StripeCharge {
    id: String,
    amount: i64,
    currency: String,
    status: String,
    failure_message: Option<String>,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
}

impl LiveGateway {
    pub fn new(api_url: String, secret_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("shop-server")
            .build()
            .context("Failed to build payment HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            secret_key,
        })
    }

    /// Classify a non-2xx response. Only card errors are declines; auth, rate-limit
    /// and request errors are faults on our side of the gateway.
    async fn failure(res: reqwest::Response) -> PaymentError {
        let status = res.status();
        let detail = res.json::<StripeErrorBody>().await.ok().map(|body| body.error);
        let card_error = status == reqwest::StatusCode::PAYMENT_REQUIRED
            || detail.as_ref().and_then(|d| d.kind.as_deref()) == Some("card_error");
        let message = detail
            .and_then(|d| d.message)
            .unwrap_or_else(|| status.to_string());

        if card_error {
            PaymentError::Declined(message)
        } else {
            tracing::error!(%status, "Payment gateway rejected the request: {message}");
            PaymentError::Unavailable(message)
        }
    }
}

#[async_trait]
impl PaymentGateway for LiveGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<Charge, PaymentError> {
        let mut form: Vec<(&str, String)> = vec![
            ("amount", request.amount.to_string()),
            ("currency", request.currency.clone()),
            ("description", request.description.clone()),
        ];
        match request.source {
            Some(PaymentSource::Token(token)) => form.push(("source", token)),
            Some(PaymentSource::StoredCard(card)) => {
                form.push(("source[object]", "card".to_string()));
                form.push(("source[number]", card.card_number));
                form.push(("source[exp_month]", card.exp_month.to_string()));
                form.push(("source[exp_year]", card.exp_year.to_string()));
                form.push(("source[cvc]", card.cvc));
            }
            None => return Err(PaymentError::Declined("no payment source".to_string())),
        }

        let res = self
            .client
            .post(format!("{}/charges", self.api_url))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable(format!("charge request failed: {e}")))?;

        if !res.status().is_success() {
            return Err(Self::failure(res).await);
        }

        let charge: StripeCharge = res
            .json()
            .await
            .map_err(|e| PaymentError::Unavailable(format!("unreadable charge response: {e}")))?;

        if charge.status != "succeeded" {
            return Err(PaymentError::Declined(
                charge.failure_message.unwrap_or(charge.status),
            ));
        }

        Ok(Charge {
            id: charge.id,
            amount: charge.amount,
            currency: charge.currency,
        })
    }

    async fn refund(&self, charge_id: &str) -> Result<(), PaymentError> {
        let res = self
            .client
            .post(format!("{}/refunds", self.api_url))
            .bearer_auth(&self.secret_key)
            .form(&[("charge", charge_id)])
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable(format!("refund request failed: {e}")))?;

        if !res.status().is_success() {
            return Err(match Self::failure(res).await {
                PaymentError::Declined(m) | PaymentError::Unavailable(m) => PaymentError::Unavailable(m),
            });
        }
        Ok(())
    }
}

/// In-process gateway. Approves every charge unless built with [`MockGateway::declining`],
/// and remembers what it was asked to do.
#[derive(Default)]
pub struct MockGateway {
    decline_reason: Option<String>,
    charges: Mutex<Vec<Charge>>,
    refunds: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declining(reason: impl Into<String>) -> Self {
        Self {
            decline_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn charges(&self) -> Vec<Charge> {
        self.charges.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn refunds(&self) -> Vec<String> {
        self.refunds.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<Charge, PaymentError> {
        if let Some(reason) = &self.decline_reason {
            return Err(PaymentError::Declined(reason.clone()));
        }

        let charge = Charge {
            id: format!("mock_ch_{}", uuid::Uuid::new_v4().simple()),
            amount: request.amount,
            currency: request.currency,
        };
        self.charges
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(charge.clone());
        Ok(charge)
    }

    async fn refund(&self, charge_id: &str) -> Result<(), PaymentError> {
        self.refunds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(charge_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use serde_json::{json, Value};

    fn request(amount: i64) -> ChargeRequest {
        ChargeRequest {
            amount,
            currency: "usd".into(),
            description: "test".into(),
            source: None,
            idempotency_key: "key-1".into(),
        }
    }

    fn token_request(amount: i64) -> ChargeRequest {
        ChargeRequest {
            source: Some(PaymentSource::Token("tok_visa".into())),
            ..request(amount)
        }
    }

    /// Local stand-in for the Stripe API: answers every call with `status` and `body`
    /// and records the idempotency keys it receives.
    async fn stub_api(status: StatusCode, body: Value) -> (LiveGateway, Arc<Mutex<Vec<String>>>) {
        let keys = Arc::new(Mutex::new(Vec::new()));
        let recorder = keys.clone();
        let reply = move |headers: HeaderMap| {
            let body = body.clone();
            let recorder = recorder.clone();
            async move {
                if let Some(key) = headers.get("idempotency-key").and_then(|v| v.to_str().ok()) {
                    recorder.lock().unwrap().push(key.to_string());
                }
                (status, axum::Json(body))
            }
        };
        let app = axum::Router::new()
            .route("/charges", post(reply.clone()))
            .route("/refunds", post(reply));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let gateway = LiveGateway::new(format!("http://{addr}"), "sk_test".into()).unwrap();
        (gateway, keys)
    }

    fn stripe_error(kind: &str, message: &str) -> Value {
        json!({ "error": { "type": kind, "message": message } })
    }

    #[tokio::test]
    async fn live_charge_succeeds_and_sends_the_idempotency_key() {
        let (gateway, keys) = stub_api(
            StatusCode::OK,
            json!({ "id": "ch_123", "amount": 1250, "currency": "usd", "status": "succeeded" }),
        )
        .await;

        let charge = gateway.charge(token_request(1250)).await.unwrap();

        assert_eq!(charge.id, "ch_123");
        assert_eq!(charge.amount, 1250);
        assert_eq!(*keys.lock().unwrap(), vec!["key-1".to_string()]);
    }

    #[tokio::test]
    async fn live_charge_with_failed_status_is_declined() {
        let (gateway, _) = stub_api(
            StatusCode::OK,
            json!({
                "id": "ch_124",
                "amount": 1250,
                "currency": "usd",
                "status": "failed",
                "failure_message": "Your card was declined."
            }),
        )
        .await;

        let err = gateway.charge(token_request(1250)).await.unwrap_err();
        assert_eq!(err, PaymentError::Declined("Your card was declined.".into()));
    }

    #[tokio::test]
    async fn live_card_error_is_declined() {
        let (gateway, _) = stub_api(
            StatusCode::PAYMENT_REQUIRED,
            stripe_error("card_error", "Insufficient funds."),
        )
        .await;

        let err = gateway.charge(token_request(1250)).await.unwrap_err();
        assert_eq!(err, PaymentError::Declined("Insufficient funds.".into()));
    }

    #[tokio::test]
    async fn live_gateway_faults_are_unavailable() {
        for (status, kind) in [
            (StatusCode::UNAUTHORIZED, "invalid_request_error"),
            (StatusCode::BAD_REQUEST, "invalid_request_error"),
            (StatusCode::TOO_MANY_REQUESTS, "rate_limit_error"),
            (StatusCode::INTERNAL_SERVER_ERROR, "api_error"),
        ] {
            let (gateway, _) = stub_api(status, stripe_error(kind, "gateway fault")).await;
            let err = gateway.charge(token_request(1250)).await.unwrap_err();
            assert_eq!(err, PaymentError::Unavailable("gateway fault".into()), "status {status}");
        }
    }

    #[tokio::test]
    async fn live_refund_maps_responses() {
        let (ok, _) = stub_api(StatusCode::OK, json!({ "id": "re_1", "status": "succeeded" })).await;
        assert!(ok.refund("ch_123").await.is_ok());

        let (failing, _) = stub_api(
            StatusCode::PAYMENT_REQUIRED,
            stripe_error("card_error", "Charge already refunded."),
        )
        .await;
        assert!(matches!(
            failing.refund("ch_123").await,
            Err(PaymentError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn mock_records_approved_charges() {
        let gateway = MockGateway::new();
        let charge = gateway.charge(request(1250)).await.unwrap();
        assert!(charge.id.starts_with("mock_ch_"));
        assert_eq!(gateway.charges(), vec![charge]);
    }

    #[tokio::test]
    async fn declining_mock_records_nothing() {
        let gateway = MockGateway::declining("insufficient_funds");
        let err = gateway.charge(request(1250)).await.unwrap_err();
        assert_eq!(err, PaymentError::Declined("insufficient_funds".into()));
        assert!(gateway.charges().is_empty());
    }

    #[tokio::test]
    async fn live_gateway_declines_without_a_source() {
        let gateway = LiveGateway::new("http://127.0.0.1:9".into(), "sk_test".into()).unwrap();
        let err = gateway.charge(request(100)).await.unwrap_err();
        assert!(matches!(err, PaymentError::Declined(_)));
    }

    #[test]
    fn mock_is_selected_when_stripe_is_off() {
        let config = Config::for_tests();
        assert!(from_config(&config).is_ok());
    }

    #[test]
    fn live_requires_a_secret_key() {
        let mut config = Config::for_tests();
        config.use_stripe = true;
        assert!(from_config(&config).is_err());
    }
}
