//! Stateless one-time account tokens for activation and password reset.
//!
//! A token is `{timestamp}-{mac}`: the timestamp in base 36 (seconds since
//! 2001-01-01) and a truncated HMAC-SHA256 over account state. Any change to
//! that state (activation, login, new password) invalidates older tokens, so
//! nothing has to be stored server-side.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use gazette_db::models::UserRow;

type HmacSha256 = Hmac<Sha256>;

pub const ACTIVATION_SALT: &str = "gazette.tokens.AccountActivation";
pub const PASSWORD_RESET_SALT: &str = "gazette.tokens.PasswordReset";

/// Unix time of 2001-01-01T00:00:00Z.
const TOKEN_EPOCH: i64 = 978_307_200;

/// Bytes of the MAC kept in the token.
const MAC_BYTES: usize = 20;

pub struct TokenGenerator<'a> {
    secret: &'a str,
    salt: &'static str,
    timeout: Duration,
}

impl<'a> TokenGenerator<'a> {
    pub fn new(secret: &'a str, salt: &'static str, timeout: Duration) -> Self {
        Self { secret, salt, timeout }
    }

    pub fn make_token(&self, user: &UserRow) -> String {
        self.make_token_at(user, now())
    }

    pub fn check_token(&self, user: &UserRow, token: &str) -> bool {
        let Some((ts_b36, mac_hex)) = token.split_once('-') else {
            return false;
        };
        // Anything longer would not fit in an i64 anyway.
        if ts_b36.is_empty() || ts_b36.len() > 12 {
            return false;
        }
        let Ok(ts) = i64::from_str_radix(ts_b36, 36) else {
            return false;
        };
        let Ok(tag) = hex::decode(mac_hex) else {
            return false;
        };
        if tag.len() != MAC_BYTES {
            return false;
        }

        let verified = self.mac(user, ts).verify_truncated_left(&tag).is_ok();
        let max_age = i64::try_from(self.timeout.as_secs()).unwrap_or(i64::MAX);
        let fresh = now().saturating_sub(ts) <= max_age;
        verified && fresh
    }

    fn make_token_at(&self, user: &UserRow, ts: i64) -> String {
        let digest = self.mac(user, ts).finalize().into_bytes();
        format!("{}-{}", to_base36(ts), hex::encode(&digest[..MAC_BYTES]))
    }

    fn mac(&self, user: &UserRow, ts: i64) -> HmacSha256 {
        let key = format!("{}{}", self.salt, self.secret);
        // HMAC takes keys of any length
        let mut mac = HmacSha256::new_from_slice(key.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        let login = user.last_login.map(|t| t.timestamp()).unwrap_or_default();
        mac.update(
            format!("{}{}{}{}{}", user.id, user.password, login, user.is_active, ts).as_bytes(),
        );
        mac
    }
}

/// Encode a user id for use in a URL path segment.
pub fn encode_uid(id: i64) -> String {
    B64.encode(id.to_string())
}

pub fn decode_uid(uidb64: &str) -> Option<i64> {
    let bytes = B64.decode(uidb64).ok()?;
    std::str::from_utf8(&bytes).ok()?.parse().ok()
}

fn now() -> i64 {
    Utc::now().timestamp() - TOKEN_EPOCH
}

fn to_base36(mut n: i64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n <= 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
