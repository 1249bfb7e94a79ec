use serde::{Deserialize, Serialize};

/// Claims carried in the session cookie.
///
/// `pwd` is a fingerprint of the password hash at sign-in time. Changing the
/// password changes the fingerprint, which invalidates every older session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub pwd: String,
    pub exp: usize,
}
