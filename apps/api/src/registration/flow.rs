//! Registration → payment → verification state machine.
//!
//! ```text
//! Details ──submit_details──▶ Payment ──confirm_payment──▶ AwaitingRedirect
//!    ▲                          │                              (browser leaves)
//!    └──────back_to_details─────┘
//!
//! resume(callback) ──▶ Verifying ──verify──▶ Success | Failed ──retry──▶ Details
//! ```
//!
//! The flow never sleeps or retries on its own. Every failure leaves the state
//! where the caller can try again.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::user::User;
use crate::payment::{Authorization, GatewayError, InitializePayment, PaymentGateway, Unconfirmed};
use crate::plans::{plan, PlanId};
use crate::registration::draft::{PaymentCallback, RegistrationDraft, RegistrationForm};
use crate::session::SessionStore;

/// Where a successful verification sends the user.
pub const DASHBOARD_PATH: &str = "/dashboard";
/// Delay before the success screen navigates to the dashboard.
pub const SUCCESS_REDIRECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationState {
    Details,
    Payment(RegistrationDraft),
    AwaitingRedirect(Authorization),
    Verifying(PaymentCallback),
    Success(Box<User>),
    /// Carries a message that is safe to show the user.
    Failed(&'static str),
}

impl RegistrationState {
    pub fn name(&self) -> &'static str {
        match self {
            RegistrationState::Details => "details",
            RegistrationState::Payment(_) => "payment",
            RegistrationState::AwaitingRedirect(_) => "awaiting_redirect",
            RegistrationState::Verifying(_) => "verifying",
            RegistrationState::Success(_) => "success",
            RegistrationState::Failed(_) => "failed",
        }
    }
}

/// Why a payment callback did not activate an account. Logged in full; only
/// `user_message` reaches the client.
#[derive(Debug, Error)]
pub enum VerificationFailure {
    #[error("gateway: {0}")]
    Gateway(#[from] GatewayError),

    #[error("{0}")]
    Unconfirmed(#[from] Unconfirmed),

    #[error("account: {0}")]
    Account(#[from] AppError),
}

impl VerificationFailure {
    pub fn user_message(&self) -> &'static str {
        match self {
            VerificationFailure::Gateway(_) => {
                "We could not confirm your payment with the provider. Please try again shortly."
            }
            VerificationFailure::Unconfirmed(Unconfirmed::NotSuccessful(_)) => {
                "Your payment was not completed."
            }
            VerificationFailure::Unconfirmed(_)
            | VerificationFailure::Account(AppError::Validation(_)) => {
                "This payment does not match your registration."
            }
            VerificationFailure::Account(AppError::InvalidCredentials | AppError::DuplicateEmail) => {
                "This email is already registered. Log in with the password you signed up with."
            }
            VerificationFailure::Account(_) => {
                "We could not activate your account. Please try again."
            }
        }
    }
}

#[derive(Debug)]
pub struct RegistrationFlow {
    state: RegistrationState,
}

impl Default for RegistrationFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_state(action: &str, state: &RegistrationState) -> AppError {
    AppError::Validation(format!("cannot {action} while in the {} step", state.name()))
}

impl RegistrationFlow {
    pub fn new() -> Self {
        Self {
            state: RegistrationState::Details,
        }
    }

    /// Re-enters the flow after the gateway redirected the browser back.
    pub fn resume(callback: PaymentCallback) -> Self {
        Self {
            state: RegistrationState::Verifying(callback),
        }
    }

    pub fn state(&self) -> &RegistrationState {
        &self.state
    }

    pub fn into_state(self) -> RegistrationState {
        self.state
    }

    /// Validates the form and moves to `Payment`. Returns the chosen plan.
    pub fn submit_details(&mut self, form: &RegistrationForm) -> Result<PlanId, AppError> {
        if !matches!(self.state, RegistrationState::Details | RegistrationState::Payment(_)) {
            return Err(wrong_state("submit details", &self.state));
        }
        let draft = form.validate().map_err(AppError::InvalidForm)?;
        let plan_id = draft.plan;
        self.state = RegistrationState::Payment(draft);
        Ok(plan_id)
    }

    pub fn back_to_details(&mut self) -> Result<(), AppError> {
        match self.state {
            RegistrationState::Payment(_) => {
                self.state = RegistrationState::Details;
                Ok(())
            }
            _ => Err(wrong_state("go back", &self.state)),
        }
    }

    /// Opens a checkout for the drafted plan and registers the user. On success
    /// the caller must navigate the browser to the returned authorization URL.
    /// On failure the flow stays in `Payment`.
    pub async fn confirm_payment(
        &mut self,
        session: &mut SessionStore,
        gateway: &dyn PaymentGateway,
        public_base_url: &str,
    ) -> Result<Authorization, AppError> {
        let RegistrationState::Payment(draft) = &self.state else {
            return Err(wrong_state("start payment", &self.state));
        };

        let selected = plan(draft.plan);
        let callback_url = draft.callback_url(public_base_url)?;
        let authorization = gateway
            .initialize(&InitializePayment {
                email: &draft.email,
                amount_ngn: selected.price.ngn,
                plan_id: draft.plan.as_str(),
                name: &draft.name,
                callback_url: callback_url.as_str(),
            })
            .await?;

        ensure_registered(session, draft).await?;

        info!(
            "Redirecting {} to the payment gateway (reference {})",
            draft.email, authorization.reference
        );
        self.state = RegistrationState::AwaitingRedirect(authorization.clone());
        Ok(authorization)
    }

    /// Confirms the payment the callback refers to and activates the account.
    /// Always ends in `Success` or `Failed`.
    pub async fn verify(
        &mut self,
        session: &mut SessionStore,
        gateway: &dyn PaymentGateway,
    ) -> &RegistrationState {
        let RegistrationState::Verifying(callback) = &self.state else {
            return &self.state;
        };

        self.state = match activate(callback, session, gateway).await {
            Ok(user) => RegistrationState::Success(Box::new(user)),
            Err(failure) => {
                warn!("Verification of {} failed: {failure}", callback.reference);
                RegistrationState::Failed(failure.user_message())
            }
        };
        &self.state
    }

    pub fn retry(&mut self) -> Result<(), AppError> {
        match self.state {
            RegistrationState::Failed(_) => {
                self.state = RegistrationState::Details;
                Ok(())
            }
            _ => Err(wrong_state("retry", &self.state)),
        }
    }
}

/// Verify with the gateway, check the charge against the drafted plan and
/// email, sign the drafted user in, then apply the payment. Repeated or
/// concurrent callbacks for the same account credit it once.
async fn activate(
    callback: &PaymentCallback,
    session: &mut SessionStore,
    gateway: &dyn PaymentGateway,
) -> Result<User, VerificationFailure> {
    let draft = &callback.draft;
    let verification = gateway.verify(&callback.reference).await?;
    let confirmed = verification.confirmed(plan(draft.plan), &draft.email)?;

    if !session.is_authenticated() {
        restore_or_register(session, draft).await?;
    }

    let user = session.verify_user(&confirmed).await?.into_user();
    info!("Payment verified for {}; account active", user.email);
    Ok(user)
}

/// Registers the drafted user unless this session already holds that pending
/// account, as it does when a payment is retried.
async fn ensure_registered(
    session: &mut SessionStore,
    draft: &RegistrationDraft,
) -> Result<User, AppError> {
    let pending = session.user().filter(|u| u.email_matches(&draft.email)).cloned();
    let user = match pending {
        Some(user) => user,
        None if session.is_authenticated() => {
            return Err(AppError::Validation(
                "Already signed in with another account".to_string(),
            ))
        }
        None => restore_or_register(session, draft).await?,
    };
    if user.is_verified {
        return Err(AppError::Validation(
            "This account is already active. Please log in.".to_string(),
        ));
    }
    Ok(user)
}

/// Signs the drafted user back in when the account already exists (it was
/// registered before the redirect), otherwise registers it now.
async fn restore_or_register(
    session: &mut SessionStore,
    draft: &RegistrationDraft,
) -> Result<User, AppError> {
    match session.login(&draft.email, &draft.password).await {
        Ok(user) => Ok(user),
        Err(AppError::InvalidCredentials) => {
            session
                .register(
                    &draft.name,
                    &draft.email,
                    &draft.password,
                    draft.plan,
                    draft.referral_code.as_deref(),
                )
                .await
        }
        Err(e) => Err(e),
    }
}
