use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use crate::payment::{GatewayError, InitializePayment};
use crate::state::AppState;

/// Errors of the proxy endpoint, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Missing required parameters")]
    MissingParameters,

    #[error("Missing transaction reference")]
    MissingReference,

    #[error("Invalid action")]
    InvalidAction,

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::Internal(detail) => {
                error!("Paystack proxy error: {detail}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<GatewayError> for ProxyError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::MissingParameter("reference") => ProxyError::MissingReference,
            GatewayError::MissingParameter(_) | GatewayError::InvalidAmount(_) => {
                ProxyError::MissingParameters
            }
            other => ProxyError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProxyRequest {
    action: Option<String>,
    email: Option<String>,
    amount: Option<Decimal>,
    #[serde(rename = "planId")]
    plan_id: Option<String>,
    name: Option<String>,
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
    reference: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// POST /functions/v1/paystack
/// Forwards `initialize` and `verify` actions to Paystack and relays its JSON.
pub async fn handle_paystack_proxy(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ProxyError> {
    let request: ProxyRequest = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::Internal(format!("unreadable request body: {e}")))?;

    match request.action.as_deref() {
        Some("initialize") => {
            let (Some(email), Some(amount), Some(plan_id)) =
                (present(&request.email), request.amount, present(&request.plan_id))
            else {
                return Err(ProxyError::MissingParameters);
            };
            let payment = InitializePayment {
                email,
                amount_ngn: amount,
                plan_id,
                name: request.name.as_deref().unwrap_or_default(),
                callback_url: request.callback_url.as_deref().unwrap_or_default(),
            };
            Ok(Json(state.paystack.initialize_raw(&payment).await?))
        }
        Some("verify") => {
            let reference = present(&request.reference).ok_or(ProxyError::MissingReference)?;
            Ok(Json(state.paystack.verify_raw(reference).await?))
        }
        _ => Err(ProxyError::InvalidAction),
    }
}
