use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use gazette_types::models::User;

use crate::error::AppError;
use crate::password;
use crate::session::{SESSION_COOKIE, Viewer, decode_token};
use crate::state::{AppState, blocking};

/// Resolve the session cookie into a `Viewer` extension for every request.
///
/// A token whose user is gone or inactive, or whose password fingerprint is
/// stale, is treated as anonymous.
pub async fn load_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let user = match jar.get(SESSION_COOKIE) {
        Some(cookie) => resolve_user(&state, cookie.value()).await,
        None => None,
    };
    req.extensions_mut().insert(Viewer(user));
    next.run(req).await
}

async fn resolve_user(state: &AppState, token: &str) -> Option<User> {
    let claims = decode_token(&state.secret_key, token)?;
    let user_id = claims.sub;

    let row = match blocking(state, move |db| db.get_user_by_id(user_id)).await {
        Ok(row) => row?,
        Err(e) => {
            warn!("Session lookup failed for user {}: {}", user_id, e);
            return None;
        }
    };

    if !row.is_active || password::fingerprint(&row.password) != claims.pwd {
        return None;
    }
    Some(row.to_user())
}

/// Send anonymous visitors to the login page, remembering where they were going.
pub async fn require_login(req: Request, next: Next) -> Response {
    if viewer(&req).is_some() {
        return next.run(req).await;
    }
    login_redirect(&req)
}

/// Staff-only routes: anonymous visitors go to login, everyone else gets a 404.
pub async fn require_staff(req: Request, next: Next) -> Response {
    match viewer(&req).map(|user| user.is_staff) {
        None => login_redirect(&req),
        Some(true) => next.run(req).await,
        Some(false) => AppError::NotFound.into_response(),
    }
}

fn viewer(req: &Request) -> Option<&User> {
    req.extensions().get::<Viewer>().and_then(|v| v.0.as_ref())
}

fn login_redirect(req: &Request) -> Response {
    let next = req.uri().path_and_query().map(|p| p.as_str()).unwrap_or("/");
    Redirect::to(&format!("/users/login/?next={}", urlencoding::encode(next))).into_response()
}
