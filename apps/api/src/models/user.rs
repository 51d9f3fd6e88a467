use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::currency::{convert_usd_to_ngn, DualAmount};
use crate::plans::PlanId;

/// An Inveron account holder as seen by sessions and API callers.
///
/// Serializes as a flat record (`balance`, `balance_naira`, ...). Records written
/// before the naira fields existed are backfilled from the USD values on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "UserRecord", into = "UserRecord")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub plan: PlanId,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub is_verified: bool,
    pub balance: DualAmount,
    pub referral_bonus: DualAmount,
    pub joined_at: DateTime<Utc>,
    /// Bumped by the account repository on every write.
    pub version: i64,
}

/// A user together with the password hash it authenticates with.
#[derive(Debug, Clone)]
pub struct Account {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: String,
    plan: PlanId,
    referral_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    referred_by: Option<String>,
    #[serde(default)]
    is_verified: bool,
    #[serde(default)]
    balance: Decimal,
    #[serde(default)]
    balance_naira: Option<Decimal>,
    #[serde(default)]
    referral_bonus: Decimal,
    #[serde(default)]
    referral_bonus_naira: Option<Decimal>,
    joined_at: DateTime<Utc>,
    #[serde(default)]
    version: i64,
}

fn backfill(usd: Decimal, ngn: Option<Decimal>) -> DualAmount {
    DualAmount {
        usd,
        ngn: ngn.unwrap_or_else(|| convert_usd_to_ngn(usd)),
    }
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        User {
            id: record.id,
            name: record.name,
            email: record.email,
            plan: record.plan,
            referral_code: record.referral_code,
            referred_by: record.referred_by,
            is_verified: record.is_verified,
            balance: backfill(record.balance, record.balance_naira),
            referral_bonus: backfill(record.referral_bonus, record.referral_bonus_naira),
            joined_at: record.joined_at,
            version: record.version,
        }
    }
}

impl From<User> for UserRecord {
    fn from(user: User) -> Self {
        UserRecord {
            id: user.id,
            name: user.name,
            email: user.email,
            plan: user.plan,
            referral_code: user.referral_code,
            referred_by: user.referred_by,
            is_verified: user.is_verified,
            balance: user.balance.usd,
            balance_naira: Some(user.balance.ngn),
            referral_bonus: user.referral_bonus.usd,
            referral_bonus_naira: Some(user.referral_bonus.ngn),
            joined_at: user.joined_at,
            version: user.version,
        }
    }
}

impl User {
    /// A freshly registered, unverified user with zero balances.
    pub fn new(
        name: &str,
        email: &str,
        plan: PlanId,
        referral_code: String,
        referred_by: Option<String>,
    ) -> Self {
        User {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            plan,
            referral_code,
            referred_by: referred_by
                .map(|code| code.trim().to_string())
                .filter(|code| !code.is_empty()),
            is_verified: false,
            balance: DualAmount::ZERO,
            referral_bonus: DualAmount::ZERO,
            joined_at: Utc::now(),
            version: 0,
        }
    }

    pub fn email_matches(&self, email: &str) -> bool {
        self.email.eq_ignore_ascii_case(email.trim())
    }
}
