use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;

use crate::currency::format_naira;
use crate::errors::AppError;
use crate::models::user::User;
use crate::referrals::{check_withdrawal, ReferralSummary};
use crate::session::handlers::{open_session, AccountView};
use crate::session::SessionStore;
use crate::state::AppState;

/// Referral features belong to paid accounts only.
fn verified_user(session: &SessionStore) -> Result<&User, AppError> {
    let user = session.user().ok_or(AppError::NoSession)?;
    if !user.is_verified {
        return Err(AppError::NotVerified);
    }
    Ok(user)
}

/// GET /api/v1/referrals
pub async fn handle_get_referrals(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Json<ReferralSummary>, AppError> {
    let session = open_session(&state, &cookies).await?;
    let user = verified_user(&session)?;
    let referred = state.accounts.list_referred(&user.referral_code).await?;
    let summary = ReferralSummary::build(user, &referred, &state.config.public_base_url)?;
    Ok(Json(summary))
}

#[derive(Deserialize)]
pub struct WithdrawRequest {
    /// Naira.
    pub amount: Decimal,
}

#[derive(Serialize)]
pub struct WithdrawResponse {
    pub message: String,
    pub account: AccountView,
}

/// POST /api/v1/referrals/withdraw
pub async fn handle_withdraw(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<WithdrawResponse>, AppError> {
    let mut session = open_session(&state, &cookies).await?;
    let user = verified_user(&session)?;
    check_withdrawal(user, req.amount)?;

    // The bonus may have moved since the check; the repository has the last word.
    if !session.withdraw_referral_bonus(req.amount).await? {
        return Err(AppError::InsufficientBalance(
            "Insufficient referral bonus".to_string(),
        ));
    }

    let user = session.user().cloned().ok_or(AppError::NoSession)?;
    Ok(Json(WithdrawResponse {
        message: format!(
            "Withdrawal of {} submitted successfully",
            format_naira(req.amount)
        ),
        account: user.into(),
    }))
}
