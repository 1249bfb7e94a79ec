//! One-shot flash messages carried between requests in a cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const MESSAGES_COOKIE: &str = "gazette_messages";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
    Info,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Error => "error",
            Level::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub level: Level,
    pub text: String,
}

/// Queue a message for the next rendered page.
pub fn push(jar: CookieJar, level: Level, text: impl Into<String>) -> CookieJar {
    let mut queued = read(&jar);
    queued.push(Message { level, text: text.into() });
    let cookie = Cookie::build((MESSAGES_COOKIE, encode(&queued)))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    jar.add(cookie)
}

/// Drain queued messages. The returned jar expires the cookie.
pub fn take(jar: CookieJar) -> (CookieJar, Vec<Message>) {
    let queued = read(&jar);
    if jar.get(MESSAGES_COOKIE).is_none() {
        return (jar, queued);
    }
    (jar.remove(Cookie::build(MESSAGES_COOKIE).path("/")), queued)
}

fn read(jar: &CookieJar) -> Vec<Message> {
    jar.get(MESSAGES_COOKIE)
        .map(|c| decode(c.value()))
        .unwrap_or_default()
}

fn encode(messages: &[Message]) -> String {
    // Serializing plain structs cannot fail.
    let json = serde_json::to_vec(messages).unwrap_or_default();
    B64.encode(json)
}

fn decode(raw: &str) -> Vec<Message> {
    if raw.is_empty() {
        return Vec::new();
    }
    B64.decode(raw)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_else(|| {
            warn!("Discarding malformed messages cookie");
            Vec::new()
        })
}
