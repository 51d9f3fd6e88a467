pub mod handlers;

use reqwest::Url;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::currency::{format_naira, DualAmount};
use crate::errors::AppError;
use crate::models::user::User;
use crate::plans::{plan, ReferralLimit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    Verified,
    Pending,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferredUser {
    pub name: String,
    pub email: String,
    pub plan: String,
    pub status: ReferralStatus,
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

impl From<&User> for ReferredUser {
    fn from(user: &User) -> Self {
        ReferredUser {
            name: user.name.clone(),
            email: user.email.clone(),
            plan: plan(user.plan).name.to_string(),
            status: if user.is_verified {
                ReferralStatus::Verified
            } else {
                ReferralStatus::Pending
            },
            joined_at: user.joined_at,
        }
    }
}

/// Everything the referral dashboard shows for one user.
#[derive(Debug, Clone, Serialize)]
pub struct ReferralSummary {
    pub referral_code: String,
    pub referral_link: String,
    pub referred: Vec<ReferredUser>,
    pub verified_count: usize,
    pub pending_count: usize,
    pub max_referrals: ReferralLimit,
    /// Verified referrals that will still earn a bonus; `None` when unlimited.
    pub remaining_referrals: Option<u32>,
    pub available_bonus: DualAmount,
    pub available_bonus_display: String,
    pub min_withdrawal: DualAmount,
    pub min_withdrawal_display: String,
    /// Naira still needed before a withdrawal is possible; zero once reached.
    pub remaining_to_withdrawal: Decimal,
    pub can_withdraw: bool,
}

/// `{base}/register?ref=CODE`
pub fn referral_link(public_base_url: &str, code: &str) -> Result<Url, AppError> {
    let mut url = Url::parse(public_base_url)
        .and_then(|base| base.join("register"))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid PUBLIC_BASE_URL: {e}")))?;
    url.query_pairs_mut().append_pair("ref", code);
    Ok(url)
}

impl ReferralSummary {
    pub fn build(user: &User, referred: &[User], public_base_url: &str) -> Result<Self, AppError> {
        let referred: Vec<ReferredUser> = referred.iter().map(ReferredUser::from).collect();
        let verified_count = referred
            .iter()
            .filter(|r| r.status == ReferralStatus::Verified)
            .count();
        let user_plan = plan(user.plan);
        let min_withdrawal = user_plan.min_withdrawal;
        let remaining = (min_withdrawal.ngn - user.referral_bonus.ngn).max(Decimal::ZERO);

        Ok(ReferralSummary {
            referral_code: user.referral_code.clone(),
            referral_link: referral_link(public_base_url, &user.referral_code)?.to_string(),
            pending_count: referred.len() - verified_count,
            max_referrals: user_plan.max_referrals,
            remaining_referrals: user_plan.max_referrals.remaining(verified_count),
            verified_count,
            referred,
            available_bonus: user.referral_bonus,
            available_bonus_display: user.referral_bonus.formatted(),
            min_withdrawal,
            min_withdrawal_display: min_withdrawal.formatted(),
            remaining_to_withdrawal: remaining,
            can_withdraw: remaining.is_zero(),
        })
    }
}

/// Checks a naira withdrawal request against the user's plan and bonus.
pub fn check_withdrawal(user: &User, amount_ngn: Decimal) -> Result<(), AppError> {
    if amount_ngn <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Withdrawal amount must be positive".to_string(),
        ));
    }
    let min_withdrawal = plan(user.plan).min_withdrawal;
    if amount_ngn < min_withdrawal.ngn {
        return Err(AppError::InsufficientBalance(format!(
            "Minimum withdrawal is {}",
            format_naira(min_withdrawal.ngn)
        )));
    }
    if amount_ngn > user.referral_bonus.ngn {
        return Err(AppError::InsufficientBalance(format!(
            "Available referral bonus is {}",
            format_naira(user.referral_bonus.ngn)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::plans::PlanId;

    fn user_with_bonus(plan: PlanId, bonus_usd: Decimal) -> User {
        let mut user = User::new("John Smith", "john@x.com", plan, "JOHNS4K2P9Q".into(), None);
        user.referral_bonus = DualAmount::from_usd(bonus_usd);
        user
    }

    #[test]
    fn test_referral_link_carries_code() {
        let link = referral_link("https://inveron.example", "JOHNS4K2P9Q").unwrap();
        assert_eq!(link.as_str(), "https://inveron.example/register?ref=JOHNS4K2P9Q");
    }

    #[test]
    fn test_summary_counts_and_remaining() {
        let referrer = user_with_bonus(PlanId::Bronze, dec!(5));
        let referred_by = Some("JOHNS4K2P9Q".to_string());
        let mut verified =
            User::new("Ann", "ann@x.com", PlanId::Silver, "ANN00AAAAAA".into(), referred_by.clone());
        verified.is_verified = true;
        let pending = User::new("Bob", "bob@x.com", PlanId::Gold, "BOB00BBBBBB".into(), referred_by);

        let summary =
            ReferralSummary::build(&referrer, &[verified, pending], "http://localhost:8080").unwrap();
        assert_eq!(summary.verified_count, 1);
        assert_eq!(summary.pending_count, 1);
        assert_eq!(summary.referred[1].status, ReferralStatus::Pending);
        assert_eq!(summary.remaining_to_withdrawal, dec!(7750));
        assert!(!summary.can_withdraw);
        assert_eq!(summary.max_referrals, ReferralLimit::Limited(5));
        assert_eq!(summary.remaining_referrals, Some(4));
    }

    #[test]
    fn test_platinum_has_no_referral_cap() {
        let referrer = user_with_bonus(PlanId::Platinum, dec!(0));
        let summary = ReferralSummary::build(&referrer, &[], "http://localhost:8080").unwrap();
        assert_eq!(summary.max_referrals, ReferralLimit::Unlimited);
        assert_eq!(summary.remaining_referrals, None);
    }

    #[test]
    fn test_withdrawal_rules() {
        let min = plan(PlanId::Bronze).min_withdrawal.ngn;
        let user = user_with_bonus(PlanId::Bronze, plan(PlanId::Bronze).min_withdrawal.usd * dec!(2));

        assert!(matches!(check_withdrawal(&user, dec!(0)), Err(AppError::Validation(_))));
        assert!(matches!(check_withdrawal(&user, dec!(-5)), Err(AppError::Validation(_))));
        assert!(matches!(
            check_withdrawal(&user, min - dec!(1)),
            Err(AppError::InsufficientBalance(_))
        ));
        assert!(matches!(
            check_withdrawal(&user, user.referral_bonus.ngn + dec!(1)),
            Err(AppError::InsufficientBalance(_))
        ));
        assert!(check_withdrawal(&user, min).is_ok());
    }
}
