use std::convert::Infallible;

use askama::Template;
use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use gazette_db::models::UserRow;
use gazette_types::models::User;
use gazette_types::session::Claims;

use crate::error::AppError;
use crate::messages::{self, Level};
use crate::password;
use crate::templates::Page;

pub const SESSION_COOKIE: &str = "gazette_session";

const SESSION_DAYS: i64 = 14;

/// The signed-in user for the current request, resolved by `load_session`.
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<User>);

pub fn create_token(secret: &str, user: &UserRow) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        pwd: password::fingerprint(&user.password),
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// Per-request view of the session: who is signed in, plus the cookie jar
/// that carries the session token and queued flash messages.
pub struct Session {
    user: Option<User>,
    jar: CookieJar,
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts.extensions.get::<Viewer>().and_then(|v| v.0.clone());
        Ok(Self {
            user,
            jar: CookieJar::from_headers(&parts.headers),
        })
    }
}

impl Session {
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// The signed-in user. Routes behind `require_login` always have one.
    pub fn require_user(&self) -> Result<&User, AppError> {
        self.user.as_ref().ok_or(AppError::NotFound)
    }

    pub fn viewer_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn success(&mut self, text: impl Into<String>) {
        self.flash(Level::Success, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.flash(Level::Error, text);
    }

    fn flash(&mut self, level: Level, text: impl Into<String>) {
        self.jar = messages::push(self.jar.clone(), level, text);
    }

    /// Context for a page render. Drains the queued flash messages.
    pub fn page(&mut self) -> Page {
        let (jar, queued) = messages::take(self.jar.clone());
        self.jar = jar;
        Page {
            user: self.user.clone(),
            messages: queued,
        }
    }

    pub fn sign_in(&mut self, secret: &str, user: &UserRow) -> Result<(), AppError> {
        let token = create_token(secret, user)?;
        let cookie = Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);
        self.jar = self.jar.clone().add(cookie);
        self.user = Some(user.to_user());
        Ok(())
    }

    pub fn sign_out(&mut self) {
        self.jar = self.jar.clone().remove(Cookie::build(SESSION_COOKIE).path("/"));
        self.user = None;
    }

    pub fn render<T: Template>(self, template: &T) -> Result<Response, AppError> {
        let html = template.render()?;
        Ok((self.jar, Html(html)).into_response())
    }

    pub fn redirect(self, to: &str) -> Response {
        (self.jar, Redirect::to(to)).into_response()
    }
}
