use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::accounts::{missing_user, AccountRepository};
use crate::currency::DualAmount;
use crate::errors::AppError;
use crate::models::user::{Account, User};

/// A process-local account registry.
///
/// Optionally sleeps before every call to stand in for a remote backend.
#[derive(Default, Clone)]
pub struct InMemoryAccountRepository {
    accounts: Arc<RwLock<Vec<Account>>>,
    latency: Option<Duration>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            accounts: Arc::default(),
            latency: (!latency.is_zero()).then_some(latency),
        }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn update<F>(&self, id: Uuid, change: F) -> Result<User, AppError>
    where
        F: FnOnce(&mut User) + Send,
    {
        self.simulate_latency().await;
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .iter_mut()
            .find(|a| a.user.id == id)
            .ok_or_else(|| missing_user(id))?;
        change(&mut account.user);
        account.user.version += 1;
        Ok(account.user.clone())
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        self.simulate_latency().await;
        let accounts = self.accounts.read().await;
        Ok(accounts.iter().find(|a| a.user.email_matches(email)).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        self.simulate_latency().await;
        let accounts = self.accounts.read().await;
        Ok(accounts
            .iter()
            .find(|a| a.user.id == id)
            .map(|a| a.user.clone()))
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<User>, AppError> {
        self.simulate_latency().await;
        let accounts = self.accounts.read().await;
        Ok(accounts
            .iter()
            .find(|a| a.user.referral_code.eq_ignore_ascii_case(code))
            .map(|a| a.user.clone()))
    }

    async fn list_referred(&self, code: &str) -> Result<Vec<User>, AppError> {
        self.simulate_latency().await;
        let accounts = self.accounts.read().await;
        let mut referred: Vec<User> = accounts
            .iter()
            .filter(|a| {
                a.user
                    .referred_by
                    .as_deref()
                    .is_some_and(|by| by.eq_ignore_ascii_case(code))
            })
            .map(|a| a.user.clone())
            .collect();
        referred.sort_by_key(|u| u.joined_at);
        Ok(referred)
    }

    async fn insert(&self, account: Account) -> Result<User, AppError> {
        self.simulate_latency().await;
        let mut accounts = self.accounts.write().await;
        if accounts
            .iter()
            .any(|a| a.user.email_matches(&account.user.email))
        {
            return Err(AppError::DuplicateEmail);
        }
        let user = account.user.clone();
        accounts.push(account);
        Ok(user)
    }

    async fn credit_balance(&self, id: Uuid, amount: DualAmount) -> Result<User, AppError> {
        self.update(id, |user| user.balance = user.balance + amount)
            .await
    }

    async fn credit_referral_bonus(
        &self,
        id: Uuid,
        amount: DualAmount,
    ) -> Result<User, AppError> {
        self.update(id, |user| user.referral_bonus = user.referral_bonus + amount)
            .await
    }

    async fn debit_referral_bonus(
        &self,
        id: Uuid,
        amount: DualAmount,
    ) -> Result<Option<User>, AppError> {
        self.simulate_latency().await;
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .iter_mut()
            .find(|a| a.user.id == id)
            .ok_or_else(|| missing_user(id))?;
        if amount.ngn > account.user.referral_bonus.ngn {
            return Ok(None);
        }
        account.user.referral_bonus = account.user.referral_bonus - amount;
        account.user.version += 1;
        Ok(Some(account.user.clone()))
    }

    async fn activate(&self, id: Uuid, amount: DualAmount) -> Result<Option<User>, AppError> {
        self.simulate_latency().await;
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .iter_mut()
            .find(|a| a.user.id == id)
            .ok_or_else(|| missing_user(id))?;
        if account.user.is_verified {
            return Ok(None);
        }
        account.user.balance = account.user.balance + amount;
        account.user.is_verified = true;
        account.user.version += 1;
        Ok(Some(account.user.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::PlanId;
    use rust_decimal_macros::dec;

    fn account(name: &str, email: &str, code: &str) -> Account {
        Account {
            user: User::new(name, email, PlanId::Gold, code.to_string(), None),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_case_insensitive() {
        let repo = InMemoryAccountRepository::new();
        repo.insert(account("Jane", "Jane@X.com", "JANE000001"))
            .await
            .unwrap();

        let found = repo.find_by_email("jane@x.COM").await.unwrap().unwrap();
        assert_eq!(found.user.name, "Jane");
        assert!(repo.find_by_email("john@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_leaves_registry_unchanged() {
        let repo = InMemoryAccountRepository::new();
        repo.insert(account("Jane", "jane@x.com", "JANE000001"))
            .await
            .unwrap();

        let err = repo
            .insert(account("Impostor", "JANE@x.com", "IMPOS00001"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));
        assert!(!repo.referral_code_exists("IMPOS00001").await.unwrap());
        assert_eq!(repo.accounts.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_credit_bumps_version_and_both_denominations() {
        let repo = InMemoryAccountRepository::new();
        let user = repo
            .insert(account("Jane", "jane@x.com", "JANE000001"))
            .await
            .unwrap();

        let updated = repo
            .credit_balance(user.id, DualAmount::from_usd(dec!(1000)))
            .await
            .unwrap();
        assert_eq!(updated.balance.usd, dec!(1000));
        assert_eq!(updated.balance.ngn, dec!(1550000));
        assert_eq!(updated.version, 1);
    }

    #[tokio::test]
    async fn test_debit_refuses_overdraw() {
        let repo = InMemoryAccountRepository::new();
        let user = repo
            .insert(account("Jane", "jane@x.com", "JANE000001"))
            .await
            .unwrap();
        repo.credit_referral_bonus(user.id, DualAmount::from_usd(dec!(20)))
            .await
            .unwrap();

        let refused = repo
            .debit_referral_bonus(user.id, DualAmount::from_ngn(dec!(31001)))
            .await
            .unwrap();
        assert!(refused.is_none());

        let after = repo
            .debit_referral_bonus(user.id, DualAmount::from_ngn(dec!(31000)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.referral_bonus.ngn, dec!(0));
        assert_eq!(after.referral_bonus.usd, dec!(0));
    }

    #[tokio::test]
    async fn test_update_unknown_user_is_not_found() {
        let repo = InMemoryAccountRepository::new();
        let err = repo
            .credit_balance(Uuid::new_v4(), DualAmount::from_usd(dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = repo
            .activate(Uuid::new_v4(), DualAmount::from_usd(dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_activate_credits_once() {
        let repo = InMemoryAccountRepository::new();
        let user = repo
            .insert(account("Jane", "jane@x.com", "JANE000001"))
            .await
            .unwrap();

        let activated = repo
            .activate(user.id, DualAmount::from_usd(dec!(1000)))
            .await
            .unwrap()
            .unwrap();
        assert!(activated.is_verified);
        assert_eq!(activated.balance.usd, dec!(1000));

        let again = repo
            .activate(user.id, DualAmount::from_usd(dec!(1000)))
            .await
            .unwrap();
        assert!(again.is_none());
        let current = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(current.balance.usd, dec!(1000));
        assert_eq!(current.version, 1);
    }

    #[tokio::test]
    async fn test_concurrent_activations_credit_once() {
        let repo = InMemoryAccountRepository::with_latency(Duration::from_millis(5));
        let user = repo
            .insert(account("Jane", "jane@x.com", "JANE000001"))
            .await
            .unwrap();

        let amount = DualAmount::from_usd(dec!(1000));
        let (a, b) = tokio::join!(repo.activate(user.id, amount), repo.activate(user.id, amount));
        let winners = [a.unwrap(), b.unwrap()].into_iter().flatten().count();
        assert_eq!(winners, 1);
        let current = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(current.balance.usd, dec!(1000));
    }

    #[tokio::test]
    async fn test_list_referred_filters_by_code() {
        let repo = InMemoryAccountRepository::new();
        let mut referred = account("Ref One", "one@x.com", "REFON00001");
        referred.user.referred_by = Some("JANE000001".into());
        repo.insert(referred).await.unwrap();
        repo.insert(account("Other", "other@x.com", "OTHER00001"))
            .await
            .unwrap();

        let list = repo.list_referred("jane000001").await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].email, "one@x.com");
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_latency_is_applied() {
        let repo = InMemoryAccountRepository::with_latency(Duration::from_millis(1000));
        let start = tokio::time::Instant::now();
        repo.find_by_email("nobody@x.com").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }
}
