//! Payment gateway: Paystack transaction initialization and verification.
//!
//! Two layers:
//! - `PaystackClient::{initialize_raw, verify_raw}` forward to Paystack and
//!   hand back its JSON untouched. The proxy endpoint serves these.
//! - The `PaymentGateway` trait interprets those envelopes for the
//!   registration workflow. `PaystackClient` implements it; tests plug in stubs.

pub mod handlers;
pub mod paystack;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::errors::AppError;
use crate::plans::{Plan, PlanId};

pub use paystack::{naira_to_kobo, PaystackClient};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid gateway URL: {0}")]
    Url(String),

    #[error("gateway rejected the request: {0}")]
    Rejected(String),

    #[error("malformed gateway response: {0}")]
    Malformed(String),
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        AppError::Gateway(e.to_string())
    }
}

/// Parameters of a checkout session. `amount_ngn` is in whole naira.
#[derive(Debug, Clone)]
pub struct InitializePayment<'a> {
    pub email: &'a str,
    pub amount_ngn: Decimal,
    pub plan_id: &'a str,
    pub name: &'a str,
    pub callback_url: &'a str,
}

/// Where to send the browser, and the reference the gateway will echo back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub authorization_url: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentVerification {
    /// Envelope-level `status` flag.
    pub status: bool,
    /// Transaction status as reported by the provider, e.g. `"success"`.
    pub provider_status: String,
    pub reference: String,
    /// Amount charged, in kobo.
    pub amount_kobo: Option<i64>,
    pub customer_email: Option<String>,
}

/// Why a verification does not count as payment for a registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Unconfirmed {
    #[error("transaction not successful (status: {0})")]
    NotSuccessful(String),

    #[error("charged {paid:?} kobo for the {plan} plan, expected {expected}")]
    AmountMismatch {
        plan: PlanId,
        expected: i64,
        paid: Option<i64>,
    },

    #[error("transaction was paid by {paid_by:?}, not {expected}")]
    CustomerMismatch {
        expected: String,
        paid_by: Option<String>,
    },
}

impl PaymentVerification {
    pub fn is_successful(&self) -> bool {
        self.status && self.provider_status == "success"
    }

    /// Proof that this transaction paid for `plan` on behalf of `email`.
    pub fn confirmed(&self, plan: &Plan, email: &str) -> Result<ConfirmedPayment, Unconfirmed> {
        if !self.is_successful() {
            let status = match self.provider_status.as_str() {
                "" => "unknown",
                status => status,
            };
            return Err(Unconfirmed::NotSuccessful(status.to_string()));
        }

        let expected = naira_to_kobo(plan.price.ngn).unwrap_or_default();
        if self.amount_kobo != Some(expected) {
            return Err(Unconfirmed::AmountMismatch {
                plan: plan.id,
                expected,
                paid: self.amount_kobo,
            });
        }

        let email = email.trim();
        let same_customer = self
            .customer_email
            .as_deref()
            .is_some_and(|paid_by| paid_by.trim().eq_ignore_ascii_case(email));
        if !same_customer {
            return Err(Unconfirmed::CustomerMismatch {
                expected: email.to_string(),
                paid_by: self.customer_email.clone(),
            });
        }

        Ok(ConfirmedPayment::new(
            self.reference.clone(),
            plan.id,
            email.to_string(),
        ))
    }
}

/// Evidence that the gateway reported a plan's full price as paid by one
/// customer. Required to verify an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedPayment {
    reference: String,
    plan: PlanId,
    email: String,
}

impl ConfirmedPayment {
    pub(crate) fn new(reference: String, plan: PlanId, email: String) -> Self {
        Self {
            reference,
            plan,
            email,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn plan(&self) -> PlanId {
        self.plan
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, payment: &InitializePayment<'_>)
        -> Result<Authorization, GatewayError>;

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: Option<String>,
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: Option<String>,
    reference: Option<String>,
    amount: Option<i64>,
    customer: Option<Customer>,
}

#[derive(Debug, Deserialize)]
struct Customer {
    email: Option<String>,
}

fn decode<T: serde::de::DeserializeOwned>(payload: Value) -> Result<Envelope<T>, GatewayError> {
    serde_json::from_value(payload).map_err(|e| GatewayError::Malformed(e.to_string()))
}

/// Reads `{status, data: {authorization_url, reference}}`.
pub fn parse_initialize_envelope(payload: Value) -> Result<Authorization, GatewayError> {
    let envelope: Envelope<InitializeData> = decode(payload)?;
    if !envelope.status {
        return Err(GatewayError::Rejected(
            envelope
                .message
                .unwrap_or_else(|| "initialization failed".to_string()),
        ));
    }
    let data = envelope
        .data
        .ok_or_else(|| GatewayError::Malformed("missing data".to_string()))?;
    let authorization_url = data
        .authorization_url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| GatewayError::Malformed("missing authorization_url".to_string()))?;
    Ok(Authorization {
        authorization_url,
        reference: data.reference.unwrap_or_default(),
    })
}

/// Reads `{status, data: {status, amount, customer: {email}}}`. A rejected
/// envelope is not an error here: it is reported as an unsuccessful
/// verification.
pub fn parse_verify_envelope(
    reference: &str,
    payload: Value,
) -> Result<PaymentVerification, GatewayError> {
    let envelope: Envelope<VerifyData> = decode(payload)?;
    let Some(data) = envelope.data else {
        return Ok(PaymentVerification {
            status: envelope.status,
            provider_status: String::new(),
            reference: reference.to_string(),
            amount_kobo: None,
            customer_email: None,
        });
    };
    Ok(PaymentVerification {
        status: envelope.status,
        provider_status: data.status.unwrap_or_default(),
        reference: data.reference.unwrap_or_else(|| reference.to_string()),
        amount_kobo: data.amount,
        customer_email: data.customer.and_then(|c| c.email),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::plan;
    use serde_json::json;

    #[test]
    fn test_initialize_envelope_success() {
        let auth = parse_initialize_envelope(json!({
            "status": true,
            "message": "Authorization URL created",
            "data": {
                "authorization_url": "https://checkout.paystack.com/abc",
                "access_code": "abc",
                "reference": "tx_1"
            }
        }))
        .unwrap();
        assert_eq!(auth.authorization_url, "https://checkout.paystack.com/abc");
        assert_eq!(auth.reference, "tx_1");
    }

    #[test]
    fn test_initialize_envelope_rejected() {
        let err = parse_initialize_envelope(json!({
            "status": false,
            "message": "Invalid key"
        }))
        .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(m) if m == "Invalid key"));
    }

    #[test]
    fn test_initialize_envelope_without_url_is_malformed() {
        let err = parse_initialize_envelope(json!({
            "status": true,
            "data": { "reference": "tx_1" }
        }))
        .unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(_)));
    }

    #[test]
    fn test_initialize_envelope_error_body_is_malformed() {
        let err = parse_initialize_envelope(json!({ "error": "Internal server error" })).unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(_)));
    }

    fn gold_paid_by(email: &str, kobo: i64) -> PaymentVerification {
        parse_verify_envelope(
            "tx_1",
            json!({
                "status": true,
                "data": {
                    "status": "success",
                    "reference": "tx_1",
                    "amount": kobo,
                    "customer": { "email": email }
                }
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_envelope_success() {
        let v = gold_paid_by("Jane@X.com", 155_000_000);
        assert!(v.is_successful());
        assert_eq!(v.amount_kobo, Some(155_000_000));

        let confirmed = v.confirmed(plan(PlanId::Gold), "jane@x.com").unwrap();
        assert_eq!(confirmed.reference(), "tx_1");
        assert_eq!(confirmed.plan(), PlanId::Gold);
        assert_eq!(confirmed.email(), "jane@x.com");
    }

    #[test]
    fn test_cheaper_payment_does_not_confirm_pricier_plan() {
        let bronze_price = naira_to_kobo(plan(PlanId::Bronze).price.ngn).unwrap();
        let v = gold_paid_by("jane@x.com", bronze_price);
        assert!(matches!(
            v.confirmed(plan(PlanId::Platinum), "jane@x.com").unwrap_err(),
            Unconfirmed::AmountMismatch { plan: PlanId::Platinum, .. }
        ));
        assert!(v.confirmed(plan(PlanId::Bronze), "jane@x.com").is_ok());
    }

    #[test]
    fn test_payment_by_another_customer_does_not_confirm() {
        let v = gold_paid_by("someone@else.com", 155_000_000);
        assert!(matches!(
            v.confirmed(plan(PlanId::Gold), "jane@x.com").unwrap_err(),
            Unconfirmed::CustomerMismatch { .. }
        ));
    }

    #[test]
    fn test_verification_without_amount_does_not_confirm() {
        let v = parse_verify_envelope(
            "tx_1",
            json!({ "status": true, "data": { "status": "success" } }),
        )
        .unwrap();
        assert!(v.is_successful());
        assert!(v.confirmed(plan(PlanId::Gold), "jane@x.com").is_err());
    }

    #[test]
    fn test_verify_envelope_abandoned() {
        let v = parse_verify_envelope(
            "tx_1",
            json!({ "status": true, "data": { "status": "abandoned" } }),
        )
        .unwrap();
        assert!(!v.is_successful());
        assert_eq!(
            v.confirmed(plan(PlanId::Gold), "jane@x.com").unwrap_err(),
            Unconfirmed::NotSuccessful("abandoned".into())
        );
        assert_eq!(v.reference, "tx_1");
    }

    #[test]
    fn test_verify_envelope_not_found() {
        let v = parse_verify_envelope(
            "tx_missing",
            json!({ "status": false, "message": "Transaction reference not found" }),
        )
        .unwrap();
        assert!(!v.is_successful());
        assert_eq!(v.provider_status, "");
    }
}
