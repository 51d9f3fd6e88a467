pub mod health;

use axum::{
    routing::{get, post},
    Router,
};
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;

use crate::payment::handlers::handle_paystack_proxy;
use crate::plans::handlers as plans;
use crate::referrals::handlers as referrals;
use crate::registration::handlers as registration;
use crate::session::handlers as session;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Gateway proxy
        .route("/functions/v1/paystack", post(handle_paystack_proxy))
        // Plans
        .route("/api/v1/plans", get(plans::handle_list_plans))
        .route("/api/v1/plans/:id", get(plans::handle_get_plan))
        // Session
        .route("/api/v1/auth/login", post(session::handle_login))
        .route("/api/v1/auth/logout", post(session::handle_logout))
        .route("/api/v1/me", get(session::handle_me))
        // Registration workflow
        .route(
            "/api/v1/registration/details",
            post(registration::handle_submit_details),
        )
        .route(
            "/api/v1/registration/payment",
            post(registration::handle_start_payment),
        )
        .route("/verification", get(registration::handle_verification))
        // Referrals
        .route("/api/v1/referrals", get(referrals::handle_get_referrals))
        .route("/api/v1/referrals/withdraw", post(referrals::handle_withdraw))
        .layer(CookieManagerLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
