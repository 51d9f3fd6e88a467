//! Plan catalog: the four investment tiers and their pricing rules.
//!
//! Prices are authored in USD; naira values are derived once when the catalog
//! is first touched.

pub mod handlers;

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::currency::DualAmount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl PlanId {
    pub const ALL: [PlanId; 4] = [PlanId::Bronze, PlanId::Silver, PlanId::Gold, PlanId::Platinum];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanId::Bronze => "bronze",
            PlanId::Silver => "silver",
            PlanId::Gold => "gold",
            PlanId::Platinum => "platinum",
        }
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPlan(pub String);

impl fmt::Display for UnknownPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown plan '{}'", self.0)
    }
}

impl std::error::Error for UnknownPlan {}

impl FromStr for PlanId {
    type Err = UnknownPlan;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlanId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPlan(s.to_string()))
    }
}

/// How many referrals a plan may be credited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralLimit {
    Limited(u32),
    Unlimited,
}

impl ReferralLimit {
    pub fn allows(&self, already_credited: usize) -> bool {
        match self {
            ReferralLimit::Limited(max) => already_credited < *max as usize,
            ReferralLimit::Unlimited => true,
        }
    }

    /// Credits still available after `already_credited`; `None` when unlimited.
    pub fn remaining(&self, already_credited: usize) -> Option<u32> {
        match self {
            ReferralLimit::Limited(max) => {
                let used = u32::try_from(already_credited).unwrap_or(u32::MAX);
                Some(max.saturating_sub(used))
            }
            ReferralLimit::Unlimited => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: &'static str,
    pub color: &'static str,
    pub description: &'static str,
    pub price: DualAmount,
    pub features: Vec<&'static str>,
    pub referral_bonus: DualAmount,
    pub min_withdrawal: DualAmount,
    pub max_referrals: ReferralLimit,
}

struct PlanEntry {
    id: PlanId,
    name: &'static str,
    color: &'static str,
    description: &'static str,
    price_usd: Decimal,
    features: &'static [&'static str],
    referral_bonus_usd: Decimal,
    min_withdrawal_usd: Decimal,
    max_referrals: ReferralLimit,
}

const PLAN_TABLE: [PlanEntry; 4] = [
    PlanEntry {
        id: PlanId::Bronze,
        name: "Bronze Plan",
        color: "#CD7F32",
        description: "Perfect for beginners in the investment world",
        price_usd: dec!(100),
        features: &[
            "Investment Duration: 30 days",
            "5% Monthly Return",
            "Refer up to 5 users",
            "Basic analytics dashboard",
        ],
        referral_bonus_usd: dec!(5),
        min_withdrawal_usd: dec!(10),
        max_referrals: ReferralLimit::Limited(5),
    },
    PlanEntry {
        id: PlanId::Silver,
        name: "Silver Plan",
        color: "#C0C0C0",
        description: "For steady investors seeking consistent returns",
        price_usd: dec!(500),
        features: &[
            "Investment Duration: 60 days",
            "7% Monthly Return",
            "Refer up to 10 users",
            "Advanced analytics dashboard",
            "Weekly investment reports",
        ],
        referral_bonus_usd: dec!(10),
        min_withdrawal_usd: dec!(20),
        max_referrals: ReferralLimit::Limited(10),
    },
    PlanEntry {
        id: PlanId::Gold,
        name: "Gold Plan",
        color: "#FFD700",
        description: "For serious investors looking for substantial returns",
        price_usd: dec!(1000),
        features: &[
            "Investment Duration: 90 days",
            "10% Monthly Return",
            "Refer up to 20 users",
            "Premium analytics dashboard",
            "Daily investment reports",
            "Priority customer support",
        ],
        referral_bonus_usd: dec!(20),
        min_withdrawal_usd: dec!(50),
        max_referrals: ReferralLimit::Limited(20),
    },
    PlanEntry {
        id: PlanId::Platinum,
        name: "Platinum Plan",
        color: "#E5E4E2",
        description: "The ultimate investment experience for elite investors",
        price_usd: dec!(5000),
        features: &[
            "Investment Duration: 180 days",
            "15% Monthly Return",
            "Unlimited referrals",
            "VIP analytics dashboard",
            "Real-time investment tracking",
            "24/7 dedicated customer support",
            "Exclusive investment opportunities",
        ],
        referral_bonus_usd: dec!(50),
        min_withdrawal_usd: dec!(100),
        max_referrals: ReferralLimit::Unlimited,
    },
];

static CATALOG: LazyLock<Vec<Plan>> = LazyLock::new(|| {
    PLAN_TABLE
        .iter()
        .map(|entry| Plan {
            id: entry.id,
            name: entry.name,
            color: entry.color,
            description: entry.description,
            price: DualAmount::from_usd(entry.price_usd),
            features: entry.features.to_vec(),
            referral_bonus: DualAmount::from_usd(entry.referral_bonus_usd),
            min_withdrawal: DualAmount::from_usd(entry.min_withdrawal_usd),
            max_referrals: entry.max_referrals,
        })
        .collect()
});

pub fn all_plans() -> &'static [Plan] {
    &CATALOG
}

/// The catalog is laid out in `PlanId::ALL` order.
pub fn plan(id: PlanId) -> &'static Plan {
    &CATALOG[id as usize]
}

/// Looks a plan up by its textual id. Unrecognized ids fall back to the first
/// catalog entry.
pub fn plan_by_id(id: &str) -> &'static Plan {
    match id.parse::<PlanId>() {
        Ok(id) => plan(id),
        Err(_) => &CATALOG[0],
    }
}
