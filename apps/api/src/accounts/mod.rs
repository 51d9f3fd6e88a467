//! Account repository: the single source of truth for users and balances.
//!
//! `AppState` holds an `Arc<dyn AccountRepository>`: `InMemoryAccountRepository`
//! for tests and local runs, `PgAccountRepository` when `DATABASE_URL` is set.
//! Balance mutations are atomic per call, so two sessions of the same user
//! can never overwrite each other's changes.

pub mod memory;
pub mod postgres;
pub mod referral;

use async_trait::async_trait;
use uuid::Uuid;

use crate::currency::DualAmount;
use crate::errors::AppError;
use crate::models::user::{Account, User};

pub use memory::InMemoryAccountRepository;
pub use postgres::PgAccountRepository;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Case-insensitive email lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<User>, AppError>;

    /// Users whose `referred_by` equals `code`, oldest first.
    async fn list_referred(&self, code: &str) -> Result<Vec<User>, AppError>;

    /// Stores a new account. Fails with `DuplicateEmail` without touching the
    /// registry when the email is taken.
    async fn insert(&self, account: Account) -> Result<User, AppError>;

    async fn credit_balance(&self, id: Uuid, amount: DualAmount) -> Result<User, AppError>;

    async fn credit_referral_bonus(&self, id: Uuid, amount: DualAmount)
        -> Result<User, AppError>;

    /// Debits the referral bonus. `Ok(None)` when the naira amount exceeds the
    /// available naira bonus; nothing is changed in that case.
    async fn debit_referral_bonus(
        &self,
        id: Uuid,
        amount: DualAmount,
    ) -> Result<Option<User>, AppError>;

    /// Credits `amount` to the balance and marks the account verified in one
    /// step. `Ok(None)` when the account was already verified; nothing is
    /// changed in that case.
    async fn activate(&self, id: Uuid, amount: DualAmount) -> Result<Option<User>, AppError>;

    async fn referral_code_exists(&self, code: &str) -> Result<bool, AppError> {
        Ok(self.find_by_referral_code(code).await?.is_some())
    }
}

pub(crate) fn missing_user(id: Uuid) -> AppError {
    AppError::NotFound(format!("User {id} not found"))
}
