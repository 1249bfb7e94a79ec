use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use sha2::{Digest, Sha256};

const MIN_LENGTH: usize = 8;

/// Attributes shorter than this are not checked for similarity.
const MIN_SIMILAR_LENGTH: usize = 3;

const COMMON_PASSWORDS: &[&str] = &[
    "123456789", "12345678", "1234567890", "password", "password1", "password123",
    "qwerty123", "qwertyuiop", "iloveyou", "11111111", "00000000", "abc12345",
    "sunshine", "princess", "football", "baseball", "welcome1", "letmein1",
    "trustno1", "superman", "starwars", "whatever", "passw0rd", "1q2w3e4r",
    "zaq12wsx", "asdfghjkl", "dragon12", "monkey12", "master12", "shadow12",
    "changeme", "computer", "internet", "michelle", "jennifer", "12341234",
];

/// Hash a password with Argon2id.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Short digest of a password hash, embedded in session tokens.
pub fn fingerprint(hash: &str) -> String {
    let digest = Sha256::digest(hash.as_bytes());
    hex::encode(&digest[..8])
}

/// Values a password must not resemble.
pub struct UserAttributes<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

/// Run the password validators. Returns every complaint, empty when acceptable.
pub fn validate_password(password: &str, attrs: &UserAttributes<'_>) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(field) = similar_attribute(password, attrs) {
        errors.push(format!("The password is too similar to the {}.", field));
    }
    if password.chars().count() < MIN_LENGTH {
        errors.push(format!(
            "This password is too short. It must contain at least {} characters.",
            MIN_LENGTH
        ));
    }
    if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        errors.push("This password is too common.".to_string());
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.push("This password is entirely numeric.".to_string());
    }

    errors
}

fn similar_attribute(password: &str, attrs: &UserAttributes<'_>) -> Option<&'static str> {
    let password = password.to_lowercase();
    let local_part = attrs.email.split('@').next().unwrap_or_default();
    let candidates = [
        ("email", attrs.email),
        ("email", local_part),
        ("first name", attrs.first_name),
        ("last name", attrs.last_name),
    ];

    candidates.into_iter().find_map(|(field, value)| {
        let value = value.to_lowercase();
        if value.chars().count() < MIN_SIMILAR_LENGTH || password.is_empty() {
            return None;
        }
        (password.contains(&value) || value.contains(&password)).then_some(field)
    })
}
