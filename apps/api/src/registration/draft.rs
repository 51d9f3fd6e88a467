use reqwest::Url;
use serde::Deserialize;

use crate::errors::{AppError, FieldError};
use crate::plans::PlanId;

const MIN_NAME_LEN: usize = 2;
const MIN_PASSWORD_LEN: usize = 8;

/// The registration form exactly as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistrationForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub plan: String,
    pub referral_code: Option<String>,
}

/// A validated registration, ready for payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationDraft {
    pub name: String,
    pub email: String,
    pub password: String,
    pub plan: PlanId,
    pub referral_code: Option<String>,
}

/// Loose email shape check: one `@`, a non-empty local part and a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}

fn normalize_referral(code: Option<&str>) -> Option<String> {
    code.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

impl RegistrationForm {
    /// Checks every field and reports all failures together.
    pub fn validate(&self) -> Result<RegistrationDraft, Vec<FieldError>> {
        let mut errors = Vec::new();

        let name = self.name.trim();
        if name.chars().count() < MIN_NAME_LEN {
            errors.push(FieldError::new("name", "Name must be at least 2 characters."));
        }

        let email = self.email.trim();
        if !is_valid_email(email) {
            errors.push(FieldError::new("email", "Please enter a valid email."));
        }

        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(FieldError::new(
                "password",
                "Password must be at least 8 characters.",
            ));
        }
        if self.password != self.confirm_password {
            errors.push(FieldError::new("confirm_password", "Passwords don't match"));
        }

        let plan = match self.plan.parse::<PlanId>() {
            Ok(plan) => Some(plan),
            Err(_) => {
                errors.push(FieldError::new("plan", "Please select a plan."));
                None
            }
        };

        match plan {
            Some(plan) if errors.is_empty() => Ok(RegistrationDraft {
                name: name.to_string(),
                email: email.to_string(),
                password: self.password.clone(),
                plan,
                referral_code: normalize_referral(self.referral_code.as_deref()),
            }),
            _ => Err(errors),
        }
    }
}

impl RegistrationDraft {
    /// `{base}/verification?plan=..&email=..&name=..&password=..[&ref=..]`
    pub fn callback_url(&self, public_base_url: &str) -> Result<Url, AppError> {
        let mut url = Url::parse(public_base_url)
            .and_then(|base| base.join("verification"))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid PUBLIC_BASE_URL: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("plan", self.plan.as_str())
                .append_pair("email", &self.email)
                .append_pair("name", &self.name)
                .append_pair("password", &self.password);
            if let Some(code) = &self.referral_code {
                query.append_pair("ref", code);
            }
        }
        Ok(url)
    }
}

/// Query parameters of `GET /verification`, as left by the gateway redirect.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CallbackQuery {
    pub reference: Option<String>,
    pub trxref: Option<String>,
    pub plan: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
    #[serde(rename = "ref")]
    pub referral_code: Option<String>,
}

/// A transaction reference together with the draft rebuilt from the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCallback {
    pub reference: String,
    pub draft: RegistrationDraft,
}

impl CallbackQuery {
    /// Rebuilds the callback. Paystack sends both `reference` and `trxref`;
    /// either is accepted.
    pub fn into_callback(self) -> Result<PaymentCallback, AppError> {
        let reference = self
            .reference
            .or(self.trxref)
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| AppError::Validation("Missing transaction reference".to_string()))?;

        let missing = |field: &str| AppError::Validation(format!("Missing {field} in callback"));
        let plan = self.plan.ok_or_else(|| missing("plan"))?;
        let plan = plan
            .parse::<PlanId>()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let email = self.email.filter(|e| !e.is_empty()).ok_or_else(|| missing("email"))?;
        let name = self.name.filter(|n| !n.is_empty()).ok_or_else(|| missing("name"))?;
        let password = self.password.ok_or_else(|| missing("password"))?;

        Ok(PaymentCallback {
            reference,
            draft: RegistrationDraft {
                name,
                email,
                password,
                plan,
                referral_code: normalize_referral(self.referral_code.as_deref()),
            },
        })
    }
}
