use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tower_cookies::{cookie::SameSite, Cookie, Cookies};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::User;
use crate::plans::handlers::PlanView;
use crate::plans::plan;
use crate::session::{record_key, SessionStore};
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "inveron_session";

fn issue_session_cookie(cookies: &Cookies) -> String {
    let id = Uuid::new_v4().to_string();
    let mut cookie = Cookie::new(SESSION_COOKIE, id.clone());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookies.add(cookie);
    id
}

/// Opens the caller's session, issuing a new session cookie if it has none.
pub async fn open_session(state: &AppState, cookies: &Cookies) -> Result<SessionStore, AppError> {
    let session_id = match cookies.get(SESSION_COOKIE) {
        Some(cookie) => cookie.value().to_string(),
        None => issue_session_cookie(cookies),
    };
    SessionStore::open(
        record_key(&session_id),
        state.accounts.clone(),
        state.sessions.clone(),
    )
    .await
}

/// Moves the session to a freshly issued cookie. The old identifier no longer
/// refers to any record.
pub async fn rotate_session(session: &mut SessionStore, cookies: &Cookies) -> Result<(), AppError> {
    let session_id = issue_session_cookie(cookies);
    session.rekey(record_key(&session_id)).await
}

/// Rotates the session when the signed-in user differs from `before`.
pub async fn rotate_if_signed_in(
    session: &mut SessionStore,
    cookies: &Cookies,
    before: Option<Uuid>,
) -> Result<(), AppError> {
    match session.user().map(|u| u.id) {
        Some(now) if Some(now) != before => rotate_session(session, cookies).await,
        _ => Ok(()),
    }
}

#[derive(Serialize)]
pub struct AccountView {
    pub user: User,
    pub plan: PlanView,
    pub balance_display: String,
    pub referral_bonus_display: String,
}

impl From<User> for AccountView {
    fn from(user: User) -> Self {
        AccountView {
            plan: PlanView::from(plan(user.plan)),
            balance_display: user.balance.formatted(),
            referral_bonus_display: user.referral_bonus.formatted(),
            user,
        }
    }
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub account: AccountView,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/v1/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let mut session = open_session(&state, &cookies).await?;
    let user = session.login(&req.email, &req.password).await?;
    rotate_session(&mut session, &cookies).await?;
    Ok(Json(AuthResponse {
        message: "Login successful!",
        account: user.into(),
    }))
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// POST /api/v1/auth/logout
pub async fn handle_logout(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Json<MessageResponse>, AppError> {
    let mut session = open_session(&state, &cookies).await?;
    session.logout().await?;
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");
    cookies.remove(cookie);
    Ok(Json(MessageResponse {
        message: "Logged out successfully",
    }))
}

/// GET /api/v1/me
pub async fn handle_me(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Json<AccountView>, AppError> {
    let session = open_session(&state, &cookies).await?;
    let user = session.user().cloned().ok_or(AppError::NoSession)?;
    Ok(Json(user.into()))
}
