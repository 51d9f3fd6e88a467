use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::payment::{
    parse_initialize_envelope, parse_verify_envelope, Authorization, GatewayError,
    InitializePayment, PaymentGateway, PaymentVerification,
};

pub const PAYSTACK_API_BASE: &str = "https://api.paystack.co";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    /// Kobo.
    amount: i64,
    callback_url: &'a str,
    metadata: InitializeMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct InitializeMetadata<'a> {
    name: &'a str,
    #[serde(rename = "planId")]
    plan_id: &'a str,
}

/// Converts whole naira into Paystack's minor unit.
pub fn naira_to_kobo(amount_ngn: Decimal) -> Result<i64, GatewayError> {
    if amount_ngn <= Decimal::ZERO {
        return Err(GatewayError::InvalidAmount(amount_ngn));
    }
    (amount_ngn * dec!(100))
        .round()
        .to_i64()
        .ok_or(GatewayError::InvalidAmount(amount_ngn))
}

/// Paystack REST client. No retries: every failure goes back to the caller.
#[derive(Clone)]
pub struct PaystackClient {
    client: Client,
    base_url: Url,
    secret_key: String,
}

impl PaystackClient {
    pub fn new(base_url: &str, secret_key: String) -> Result<Self, GatewayError> {
        let base_url = Url::parse(base_url).map_err(|e| GatewayError::Url(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Url(format!("{base_url} cannot be a base URL")));
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url,
            secret_key,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// POST /transaction/initialize, returning Paystack's payload verbatim.
    pub async fn initialize_raw(
        &self,
        payment: &InitializePayment<'_>,
    ) -> Result<Value, GatewayError> {
        if payment.email.trim().is_empty() {
            return Err(GatewayError::MissingParameter("email"));
        }
        if payment.plan_id.trim().is_empty() {
            return Err(GatewayError::MissingParameter("planId"));
        }
        let body = InitializeBody {
            email: payment.email,
            amount: naira_to_kobo(payment.amount_ngn)?,
            callback_url: payment.callback_url,
            metadata: InitializeMetadata {
                name: payment.name,
                plan_id: payment.plan_id,
            },
        };

        let url = self.endpoint(&["transaction", "initialize"])?;
        debug!("Initializing Paystack transaction for {} ({} kobo)", body.email, body.amount);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await?;
        Ok(response.json().await?)
    }

    /// GET /transaction/verify/{reference}, returning Paystack's payload verbatim.
    pub async fn verify_raw(&self, reference: &str) -> Result<Value, GatewayError> {
        if reference.trim().is_empty() {
            return Err(GatewayError::MissingParameter("reference"));
        }
        let url = self.endpoint(&["transaction", "verify", reference])?;
        debug!("Verifying Paystack transaction {reference}");
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize(
        &self,
        payment: &InitializePayment<'_>,
    ) -> Result<Authorization, GatewayError> {
        let payload = self.initialize_raw(payment).await?;
        parse_initialize_envelope(payload)
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, GatewayError> {
        let payload = self.verify_raw(reference).await?;
        parse_verify_envelope(reference, payload)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::HeaderMap,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;

    /// Serves a fake Paystack API on an ephemeral port and returns its base URL.
    pub(crate) async fn spawn_fake_paystack() -> String {
        async fn initialize(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                == Some("Bearer sk_test_secret");
            if !authorized {
                return Json(json!({ "status": false, "message": "Invalid key" }));
            }
            Json(json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.paystack.com/tx_1",
                    "reference": "tx_1",
                    "echo": body
                }
            }))
        }

        async fn verify(Path(reference): Path<String>) -> Json<Value> {
            let status = if reference == "tx_1" { "success" } else { "failed" };
            Json(json!({
                "status": true,
                "data": {
                    "status": status,
                    "reference": reference,
                    "amount": 155_000_000,
                    "customer": { "email": "jane@x.com" }
                }
            }))
        }

        let app = Router::new()
            .route("/transaction/initialize", post(initialize))
            .route("/transaction/verify/:reference", get(verify));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn payment(amount_ngn: Decimal) -> InitializePayment<'static> {
        InitializePayment {
            email: "jane@x.com",
            amount_ngn,
            plan_id: "gold",
            name: "Jane Doe",
            callback_url: "http://localhost:8080/verification?plan=gold",
        }
    }

    #[test]
    fn test_naira_to_kobo() {
        assert_eq!(naira_to_kobo(dec!(1550000)).unwrap(), 155_000_000);
        assert_eq!(naira_to_kobo(dec!(0.5)).unwrap(), 50);
        assert!(naira_to_kobo(dec!(0)).is_err());
        assert!(naira_to_kobo(dec!(-10)).is_err());
    }

    #[test]
    fn test_endpoint_keeps_base_path_and_escapes_reference() {
        let client = PaystackClient::new("http://localhost:9000/paystack/", "k".into()).unwrap();
        let url = client.endpoint(&["transaction", "verify", "a/b c"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9000/paystack/transaction/verify/a%2Fb%20c"
        );
    }

    #[tokio::test]
    async fn test_initialize_raw_forwards_kobo_and_metadata() {
        let base = spawn_fake_paystack().await;
        let client = PaystackClient::new(&base, "sk_test_secret".into()).unwrap();

        let payload = client.initialize_raw(&payment(dec!(1550000))).await.unwrap();
        let echo = &payload["data"]["echo"];
        assert_eq!(echo["amount"], 155_000_000);
        assert_eq!(echo["metadata"]["planId"], "gold");
        assert_eq!(echo["metadata"]["name"], "Jane Doe");
        assert_eq!(echo["callback_url"], "http://localhost:8080/verification?plan=gold");
    }

    #[tokio::test]
    async fn test_initialize_with_bad_key_is_rejected() {
        let base = spawn_fake_paystack().await;
        let client = PaystackClient::new(&base, "sk_wrong".into()).unwrap();
        let err = client.initialize(&payment(dec!(155000))).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_verify_through_gateway_trait() {
        let base = spawn_fake_paystack().await;
        let client = PaystackClient::new(&base, "sk_test_secret".into()).unwrap();
        let paid = client.verify("tx_1").await.unwrap();
        assert!(paid.is_successful());
        assert_eq!(paid.amount_kobo, Some(155_000_000));
        assert_eq!(paid.customer_email.as_deref(), Some("jane@x.com"));
        assert!(!client.verify("tx_2").await.unwrap().is_successful());
    }

    #[tokio::test]
    async fn test_missing_parameters_never_reach_upstream() {
        let client = PaystackClient::new("http://127.0.0.1:9", "k".into()).unwrap();
        assert!(matches!(
            client.verify_raw("").await.unwrap_err(),
            GatewayError::MissingParameter("reference")
        ));
        let mut p = payment(dec!(100));
        p.email = "";
        assert!(matches!(
            client.initialize_raw(&p).await.unwrap_err(),
            GatewayError::MissingParameter("email")
        ));
    }
}
