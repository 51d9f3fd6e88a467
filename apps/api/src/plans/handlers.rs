use axum::{extract::Path, Json};
use serde::Serialize;

use crate::plans::{all_plans, plan_by_id, Plan};

#[derive(Serialize)]
pub struct PlanView {
    #[serde(flatten)]
    pub plan: &'static Plan,
    pub price_display: String,
    pub referral_bonus_display: String,
    pub min_withdrawal_display: String,
}

impl From<&'static Plan> for PlanView {
    fn from(plan: &'static Plan) -> Self {
        PlanView {
            plan,
            price_display: plan.price.formatted(),
            referral_bonus_display: plan.referral_bonus.formatted(),
            min_withdrawal_display: plan.min_withdrawal.formatted(),
        }
    }
}

/// GET /api/v1/plans
pub async fn handle_list_plans() -> Json<Vec<PlanView>> {
    Json(all_plans().iter().map(PlanView::from).collect())
}

/// GET /api/v1/plans/:id
/// Unknown ids resolve to the first plan rather than 404.
pub async fn handle_get_plan(Path(id): Path<String>) -> Json<PlanView> {
    Json(PlanView::from(plan_by_id(&id)))
}
