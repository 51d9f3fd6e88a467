use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::accounts::{missing_user, AccountRepository};
use crate::currency::DualAmount;
use crate::errors::AppError;
use crate::models::user::{Account, User};
use crate::plans::PlanId;

/// Account repository backed by the `users` table.
///
/// Every balance change is a single `UPDATE ... RETURNING` statement, so
/// concurrent writers are serialized by PostgreSQL row locks.
#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    plan: String,
    referral_code: String,
    referred_by: Option<String>,
    is_verified: bool,
    balance_usd: Decimal,
    balance_ngn: Decimal,
    referral_bonus_usd: Decimal,
    referral_bonus_ngn: Decimal,
    joined_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<UserRow> for Account {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let plan: PlanId = row
            .plan
            .parse()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("user {}: {e}", row.id)))?;
        Ok(Account {
            password_hash: row.password_hash,
            user: User {
                id: row.id,
                name: row.name,
                email: row.email,
                plan,
                referral_code: row.referral_code,
                referred_by: row.referred_by,
                is_verified: row.is_verified,
                balance: DualAmount {
                    usd: row.balance_usd,
                    ngn: row.balance_ngn,
                },
                referral_bonus: DualAmount {
                    usd: row.referral_bonus_usd,
                    ngn: row.referral_bonus_ngn,
                },
                joined_at: row.joined_at,
                version: row.version,
            },
        })
    }
}

fn into_user(row: UserRow) -> Result<User, AppError> {
    Account::try_from(row).map(|a| a.user)
}

fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() && db.constraint().is_some_and(|c| c == constraint)
        }
        _ => false,
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT * FROM users WHERE lower(email) = lower($1)")
                .bind(email.trim())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Account::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(into_user).transpose()
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<User>, AppError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT * FROM users WHERE upper(referral_code) = upper($1)")
                .bind(code.trim())
                .fetch_optional(&self.pool)
                .await?;
        row.map(into_user).transpose()
    }

    async fn list_referred(&self, code: &str) -> Result<Vec<User>, AppError> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT * FROM users WHERE upper(referred_by) = upper($1) ORDER BY joined_at",
        )
        .bind(code.trim())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(into_user).collect()
    }

    async fn insert(&self, account: Account) -> Result<User, AppError> {
        let Account {
            user,
            password_hash,
        } = account;

        let row: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users
                (id, name, email, password_hash, plan, referral_code, referred_by,
                 is_verified, balance_usd, balance_ngn, referral_bonus_usd,
                 referral_bonus_ngn, joined_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&password_hash)
        .bind(user.plan.as_str())
        .bind(&user.referral_code)
        .bind(&user.referred_by)
        .bind(user.is_verified)
        .bind(user.balance.usd)
        .bind(user.balance.ngn)
        .bind(user.referral_bonus.usd)
        .bind(user.referral_bonus.ngn)
        .bind(user.joined_at)
        .bind(user.version)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "users_email_lower_idx") {
                AppError::DuplicateEmail
            } else {
                AppError::Database(e)
            }
        })?;
        into_user(row)
    }

    async fn credit_balance(&self, id: Uuid, amount: DualAmount) -> Result<User, AppError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            UPDATE users
            SET balance_usd = balance_usd + $2,
                balance_ngn = balance_ngn + $3,
                version = version + 1
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(amount.usd)
        .bind(amount.ngn)
        .fetch_optional(&self.pool)
        .await?;
        row.map(into_user).transpose()?.ok_or_else(|| missing_user(id))
    }

    async fn credit_referral_bonus(
        &self,
        id: Uuid,
        amount: DualAmount,
    ) -> Result<User, AppError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            UPDATE users
            SET referral_bonus_usd = referral_bonus_usd + $2,
                referral_bonus_ngn = referral_bonus_ngn + $3,
                version = version + 1
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(amount.usd)
        .bind(amount.ngn)
        .fetch_optional(&self.pool)
        .await?;
        row.map(into_user).transpose()?.ok_or_else(|| missing_user(id))
    }

    async fn debit_referral_bonus(
        &self,
        id: Uuid,
        amount: DualAmount,
    ) -> Result<Option<User>, AppError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            UPDATE users
            SET referral_bonus_usd = referral_bonus_usd - $2,
                referral_bonus_ngn = referral_bonus_ngn - $3,
                version = version + 1
            WHERE id = $1 AND referral_bonus_ngn >= $3
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(amount.usd)
        .bind(amount.ngn)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => into_user(row).map(Some),
            // Either the user is gone or the bonus is too small.
            None => match self.find_by_id(id).await? {
                Some(_) => Ok(None),
                None => Err(missing_user(id)),
            },
        }
    }

    async fn activate(&self, id: Uuid, amount: DualAmount) -> Result<Option<User>, AppError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            UPDATE users
            SET balance_usd = balance_usd + $2,
                balance_ngn = balance_ngn + $3,
                is_verified = TRUE,
                version = version + 1
            WHERE id = $1 AND NOT is_verified
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(amount.usd)
        .bind(amount.ngn)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => into_user(row).map(Some),
            None => match self.find_by_id(id).await? {
                Some(_) => Ok(None),
                None => Err(missing_user(id)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, ensure_schema};
    use rust_decimal_macros::dec;

    /// Runs only against a disposable database named by `TEST_DATABASE_URL`.
    async fn repository() -> Option<PgAccountRepository> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = create_pool(&url).await.unwrap();
        ensure_schema(&pool).await.unwrap();
        Some(PgAccountRepository::new(pool))
    }

    fn account(email: &str) -> Account {
        let code = format!("T{}", &Uuid::new_v4().simple().to_string()[..9]).to_uppercase();
        Account {
            user: User::new("Test User", email, PlanId::Gold, code, None),
            password_hash: "hash".to_string(),
        }
    }

    fn unique_email() -> String {
        format!("{}@x.com", Uuid::new_v4().simple())
    }

    #[tokio::test]
    async fn test_email_is_unique_regardless_of_case() {
        let Some(repo) = repository().await else { return };
        let email = unique_email();
        repo.insert(account(&email)).await.unwrap();

        let err = repo
            .insert(account(&email.to_uppercase()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));
        assert!(repo.find_by_email(&email.to_uppercase()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_guarded_debit_refuses_overdraw() {
        let Some(repo) = repository().await else { return };
        let user = repo.insert(account(&unique_email())).await.unwrap();
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
        assert_eq!(after.version, 2);
    }

    #[tokio::test]
    async fn test_activate_applies_once() {
        let Some(repo) = repository().await else { return };
        let user = repo.insert(account(&unique_email())).await.unwrap();
        let amount = DualAmount::from_usd(dec!(1000));

        let (a, b) = tokio::join!(repo.activate(user.id, amount), repo.activate(user.id, amount));
        let winners = [a.unwrap(), b.unwrap()].into_iter().flatten().count();
        assert_eq!(winners, 1);

        let current = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert!(current.is_verified);
        assert_eq!(current.balance.usd, dec!(1000));
        assert_eq!(current.balance.ngn, dec!(1550000));
    }

    #[tokio::test]
    async fn test_mutating_missing_user_is_not_found() {
        let Some(repo) = repository().await else { return };
        let id = Uuid::new_v4();
        let amount = DualAmount::from_usd(dec!(1));
        assert!(matches!(
            repo.activate(id, amount).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            repo.debit_referral_bonus(id, amount).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            repo.credit_balance(id, amount).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
