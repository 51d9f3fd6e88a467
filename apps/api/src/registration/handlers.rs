use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;
use tower_cookies::Cookies;

use crate::errors::AppError;
use crate::plans::handlers::PlanView;
use crate::plans::plan;
use crate::registration::flow::{DASHBOARD_PATH, SUCCESS_REDIRECT_DELAY};
use crate::registration::{CallbackQuery, RegistrationFlow, RegistrationForm, RegistrationState};
use crate::session::handlers::{open_session, rotate_if_signed_in, AccountView};
use crate::state::AppState;

const RETRY_PATH: &str = "/register";

#[derive(Serialize)]
pub struct PaymentStepResponse {
    pub step: &'static str,
    pub plan: PlanView,
    pub amount_display: String,
}

/// POST /api/v1/registration/details
pub async fn handle_submit_details(
    Json(form): Json<RegistrationForm>,
) -> Result<Json<PaymentStepResponse>, AppError> {
    let mut flow = RegistrationFlow::new();
    let selected = plan(flow.submit_details(&form)?);
    Ok(Json(PaymentStepResponse {
        step: flow.state().name(),
        plan: PlanView::from(selected),
        amount_display: selected.price.formatted(),
    }))
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub message: &'static str,
    pub authorization_url: String,
    pub reference: String,
}

/// POST /api/v1/registration/payment
/// Starts checkout and registers the (still unverified) user. The client
/// navigates to `authorization_url`.
pub async fn handle_start_payment(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(form): Json<RegistrationForm>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let mut session = open_session(&state, &cookies).await?;
    let before = session.user().map(|u| u.id);
    let mut flow = RegistrationFlow::new();
    flow.submit_details(&form)?;
    let authorization = flow
        .confirm_payment(
            &mut session,
            state.gateway.as_ref(),
            &state.config.public_base_url,
        )
        .await?;
    rotate_if_signed_in(&mut session, &cookies, before).await?;

    Ok(Json(CheckoutResponse {
        message: "Redirecting to payment gateway...",
        authorization_url: authorization.authorization_url,
        reference: authorization.reference,
    }))
}

#[derive(Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VerificationResponse {
    Success {
        message: &'static str,
        account: Box<AccountView>,
        redirect_to: &'static str,
        redirect_after_ms: u64,
    },
    Failed {
        message: &'static str,
        reason: &'static str,
        retry_path: &'static str,
    },
}

/// GET /verification
/// The gateway redirects the browser here after checkout.
pub async fn handle_verification(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<VerificationResponse>, AppError> {
    let callback = query.into_callback()?;
    let mut session = open_session(&state, &cookies).await?;
    let before = session.user().map(|u| u.id);

    let mut flow = RegistrationFlow::resume(callback);
    flow.verify(&mut session, state.gateway.as_ref()).await;
    rotate_if_signed_in(&mut session, &cookies, before).await?;

    let response = match flow.into_state() {
        RegistrationState::Success(user) => VerificationResponse::Success {
            message: "Payment successful! Your account is now active.",
            account: Box::new(AccountView::from(*user)),
            redirect_to: DASHBOARD_PATH,
            redirect_after_ms: SUCCESS_REDIRECT_DELAY.as_millis() as u64,
        },
        RegistrationState::Failed(reason) => VerificationResponse::Failed {
            message: "Payment verification failed. Please try again or contact support.",
            reason,
            retry_path: RETRY_PATH,
        },
        other => {
            return Err(AppError::Internal(anyhow::anyhow!(
                "verification ended in the {} step",
                other.name()
            )))
        }
    };
    Ok(Json(response))
}
