//! Session store: the signed-in user for one client, mirrored to durable
//! storage after every change.
//!
//! A `SessionStore` is opened per request from the client's session key and
//! dropped at the end of it. The account repository stays authoritative: the
//! stored record is only a cache that is refreshed on open and rewritten after
//! every mutation.

pub mod handlers;
pub mod storage;

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::accounts::referral::unique_referral_code;
use crate::accounts::{missing_user, AccountRepository};
use crate::currency::{format_naira, DualAmount};
use crate::errors::AppError;
use crate::models::user::{Account, User};
use crate::payment::ConfirmedPayment;
use crate::plans::{plan, PlanId};

pub use storage::{FileSessionStorage, MemorySessionStorage, RedisSessionStorage, SessionStorage};

/// Prefix of every durable session record key.
pub const SESSION_RECORD_PREFIX: &str = "inveron_user";

#[cfg(not(test))]
const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const BCRYPT_COST: u32 = 4;

pub fn record_key(session_id: &str) -> String {
    format!("{SESSION_RECORD_PREFIX}:{session_id}")
}

/// Outcome of applying a confirmed payment to the session user.
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    /// This call credited the plan price and verified the account.
    Activated(User),
    /// The account was verified earlier; nothing was credited.
    AlreadyVerified(User),
}

impl Activation {
    pub fn into_user(self) -> User {
        match self {
            Activation::Activated(user) | Activation::AlreadyVerified(user) => user,
        }
    }
}

pub struct SessionStore {
    key: String,
    user: Option<User>,
    accounts: Arc<dyn AccountRepository>,
    storage: Arc<dyn SessionStorage>,
}

impl SessionStore {
    /// Loads the record stored under `key`, backfilling naira fields and
    /// refreshing the user from the repository. Unreadable records and records
    /// whose user no longer exists are removed.
    pub async fn open(
        key: String,
        accounts: Arc<dyn AccountRepository>,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Self, AppError> {
        let mut session = SessionStore {
            key,
            user: None,
            accounts,
            storage,
        };

        let Some(record) = session.storage.load(&session.key).await? else {
            return Ok(session);
        };

        let stored: User = match serde_json::from_str(&record) {
            Ok(user) => user,
            Err(e) => {
                error!("Failed to parse session record {}: {e}", session.key);
                session.storage.remove(&session.key).await?;
                return Ok(session);
            }
        };

        match session.accounts.find_by_id(stored.id).await? {
            Some(current) => {
                if current.version != stored.version {
                    debug!(
                        "Session record {} was at version {}, repository has {}",
                        session.key, stored.version, current.version
                    );
                }
                session.set_user(current).await?;
            }
            None => {
                warn!("Session record {} refers to unknown user {}", session.key, stored.id);
                session.storage.remove(&session.key).await?;
            }
        }

        Ok(session)
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    fn require_user(&self) -> Result<&User, AppError> {
        self.user.as_ref().ok_or(AppError::NoSession)
    }

    async fn set_user(&mut self, user: User) -> Result<User, AppError> {
        let record = serde_json::to_string(&user)
            .map_err(|e| AppError::Storage(format!("failed to encode session record: {e}")))?;
        self.storage.save(&self.key, &record).await?;
        self.user = Some(user.clone());
        Ok(user)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<User, AppError> {
        let account = self
            .accounts
            .find_by_email(email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !bcrypt::verify(password, &account.password_hash)? {
            warn!("Rejected login for {}", account.user.email);
            return Err(AppError::InvalidCredentials);
        }

        info!("Login successful for {}", account.user.email);
        self.set_user(account.user).await
    }

    pub async fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
        plan_id: PlanId,
        referral_code: Option<&str>,
    ) -> Result<User, AppError> {
        if self.accounts.find_by_email(email).await?.is_some() {
            return Err(AppError::DuplicateEmail);
        }

        let code = unique_referral_code(self.accounts.as_ref(), name).await?;
        let password_hash = bcrypt::hash(password, BCRYPT_COST)?;
        let user = User::new(name, email, plan_id, code, referral_code.map(str::to_string));

        let user = self
            .accounts
            .insert(Account {
                user,
                password_hash,
            })
            .await?;

        info!(
            "Registration successful for {} on the {} plan; payment pending",
            user.email, user.plan
        );
        self.set_user(user).await
    }

    pub async fn logout(&mut self) -> Result<(), AppError> {
        if let Some(user) = self.user.take() {
            info!("Logged out {}", user.email);
        }
        self.storage.remove(&self.key).await
    }

    /// Moves the record to `key` and removes the old one.
    pub async fn rekey(&mut self, key: String) -> Result<(), AppError> {
        if let Some(user) = self.user.clone() {
            let record = serde_json::to_string(&user)
                .map_err(|e| AppError::Storage(format!("failed to encode session record: {e}")))?;
            self.storage.save(&key, &record).await?;
        }
        let old = std::mem::replace(&mut self.key, key);
        self.storage.remove(&old).await
    }

    /// Credits the plan price and verifies the account, at most once per
    /// account. The payment must be for the session user's email and plan.
    /// The first activation also credits the user's referrer.
    pub async fn verify_user(
        &mut self,
        payment: &ConfirmedPayment,
    ) -> Result<Activation, AppError> {
        let user = self.require_user()?;
        if !user.email_matches(payment.email()) || user.plan != payment.plan() {
            return Err(AppError::Validation(format!(
                "Payment {} was not made for this account",
                payment.reference()
            )));
        }
        let id = user.id;

        let Some(user) = self.accounts.activate(id, plan(payment.plan()).price).await? else {
            let user = self.accounts.find_by_id(id).await?.ok_or_else(|| missing_user(id))?;
            info!(
                "{} is already verified; ignoring payment {}",
                user.email,
                payment.reference()
            );
            return Ok(Activation::AlreadyVerified(self.set_user(user).await?));
        };
        info!(
            "Account {} verified by payment {}",
            user.email,
            payment.reference()
        );

        if let Some(code) = user.referred_by.as_deref() {
            if let Err(e) = self.credit_referrer(code).await {
                warn!("Could not credit referrer {code}: {e}");
            }
        }
        Ok(Activation::Activated(self.set_user(user).await?))
    }

    /// Adds a USD amount to the balance; the naira side follows.
    pub async fn update_user_balance(&mut self, usd: Decimal) -> Result<User, AppError> {
        let id = self.require_user()?.id;
        let user = self
            .accounts
            .credit_balance(id, DualAmount::from_usd(usd))
            .await?;
        self.set_user(user).await
    }

    /// Adds a USD amount to the referral bonus; the naira side follows.
    pub async fn update_referral_bonus(&mut self, usd: Decimal) -> Result<User, AppError> {
        let id = self.require_user()?.id;
        let amount = DualAmount::from_usd(usd);
        let user = self.accounts.credit_referral_bonus(id, amount).await?;
        info!(
            "Referral bonus of {} added to {}",
            format_naira(amount.ngn),
            user.email
        );
        self.set_user(user).await
    }

    /// Withdraws a naira amount from the referral bonus. Returns `false` and
    /// leaves balances untouched when the bonus does not cover it.
    pub async fn withdraw_referral_bonus(&mut self, ngn: Decimal) -> Result<bool, AppError> {
        let id = self.require_user()?.id;
        match self
            .accounts
            .debit_referral_bonus(id, DualAmount::from_ngn(ngn))
            .await?
        {
            Some(user) => {
                info!("Withdrew {} for {}", format_naira(ngn), user.email);
                self.set_user(user).await?;
                Ok(true)
            }
            None => {
                warn!("Insufficient referral bonus for withdrawal of {}", format_naira(ngn));
                Ok(false)
            }
        }
    }

    /// Credits the holder of `referral_code` with its own plan's referral bonus,
    /// unless it is unverified or has already been credited for as many
    /// referrals as its plan allows. The session user is assumed to be the
    /// referred user and is excluded from the count.
    pub async fn credit_referrer(&self, referral_code: &str) -> Result<Option<User>, AppError> {
        let Some(referrer) = self.accounts.find_by_referral_code(referral_code).await? else {
            debug!("No user holds referral code {referral_code}");
            return Ok(None);
        };
        let current = self.user.as_ref().map(|u| u.id);
        if Some(referrer.id) == current {
            return Ok(None);
        }
        if !referrer.is_verified {
            info!("Referrer {} is not verified; no bonus credited", referrer.email);
            return Ok(None);
        }

        let referrer_plan = plan(referrer.plan);
        let credited = self
            .accounts
            .list_referred(&referrer.referral_code)
            .await?
            .iter()
            .filter(|u| u.is_verified && Some(u.id) != current)
            .count();
        if !referrer_plan.max_referrals.allows(credited) {
            info!(
                "Referrer {} reached the {} referral limit",
                referrer.email, referrer_plan.name
            );
            return Ok(None);
        }

        let referrer = self
            .accounts
            .credit_referral_bonus(referrer.id, referrer_plan.referral_bonus)
            .await?;
        info!(
            "Credited referral bonus of {} to {}",
            referrer_plan.referral_bonus.formatted(),
            referrer.email
        );
        Ok(Some(referrer))
    }
}
