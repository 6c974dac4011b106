use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION_V1: &str = "v1";
const MAX_TOKEN_LEN: usize = 2048;
const PASSWORD_SCHEME: &str = "pbkdf2-sha256";
const PASSWORD_ITERATIONS: u32 = 10_000;
const DIGEST_LEN: usize = 32;
const SALT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenErrorCode {
    InvalidFormat,
    UnsupportedVersion,
    InvalidSignature,
    InvalidPayload,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenError {
    pub code: TokenErrorCode,
    pub message: String,
}

impl TokenError {
    fn new(code: TokenErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for TokenError {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
}

pub fn issue_token(claims: &Claims, secret: &[u8]) -> Result<String, TokenError> {
    let payload = serde_json::to_vec(claims)
        .map_err(|e| TokenError::new(TokenErrorCode::InvalidPayload, e.to_string()))?;
    let payload_part = URL_SAFE_NO_PAD.encode(payload);
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| TokenError::new(TokenErrorCode::InvalidPayload, e.to_string()))?;
    mac.update(TOKEN_VERSION_V1.as_bytes());
    mac.update(b".");
    mac.update(payload_part.as_bytes());
    let sig_part = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{TOKEN_VERSION_V1}.{payload_part}.{sig_part}"))
}

/// Checks signature first, then expiry against `now` (unix seconds).
pub fn verify_token(token: &str, secret: &[u8], now: i64) -> Result<Claims, TokenError> {
    let token = token.trim();
    let token = token
        .strip_prefix("Bearer ")
        .or_else(|| token.strip_prefix("bearer "))
        .unwrap_or(token)
        .trim();
    if token.is_empty() || token.len() > MAX_TOKEN_LEN {
        return Err(TokenError::new(
            TokenErrorCode::InvalidFormat,
            "token is empty or too long",
        ));
    }

    let mut parts = token.split('.');
    let (Some(version), Some(payload_part), Some(sig_part), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::new(
            TokenErrorCode::InvalidFormat,
            "token must have three parts",
        ));
    };
    if version != TOKEN_VERSION_V1 {
        return Err(TokenError::new(
            TokenErrorCode::UnsupportedVersion,
            "token version unsupported",
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| TokenError::new(TokenErrorCode::InvalidPayload, e.to_string()))?;
    mac.update(version.as_bytes());
    mac.update(b".");
    mac.update(payload_part.as_bytes());
    let expected = URL_SAFE_NO_PAD
        .decode(sig_part)
        .map_err(|e| TokenError::new(TokenErrorCode::InvalidFormat, e.to_string()))?;
    mac.verify_slice(&expected).map_err(|_| {
        TokenError::new(TokenErrorCode::InvalidSignature, "token signature mismatch")
    })?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_part)
        .map_err(|e| TokenError::new(TokenErrorCode::InvalidFormat, e.to_string()))?;
    let claims: Claims = serde_json::from_slice(&payload)
        .map_err(|e| TokenError::new(TokenErrorCode::InvalidPayload, e.to_string()))?;
    if claims.exp <= now {
        return Err(TokenError::new(TokenErrorCode::Expired, "token expired"));
    }
    Ok(claims)
}

fn stretch(salt: &[u8], password: &str, iterations: u32) -> [u8; DIGEST_LEN] {
    let mut digest = [0u8; DIGEST_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut digest);
    digest
}

/// Format: `pbkdf2-sha256$<iterations>$<salt hex>$<digest hex>`.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = stretch(&salt, password, PASSWORD_ITERATIONS);
    format!(
        "{PASSWORD_SCHEME}${PASSWORD_ITERATIONS}${}${}",
        hex::encode(salt),
        hex::encode(digest)
    )
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(digest), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != PASSWORD_SCHEME {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(digest)) else {
        return false;
    };
    if iterations == 0 || expected.len() != DIGEST_LEN {
        return false;
    }
    let actual = stretch(&salt, password, iterations);
    actual[..].ct_eq(&expected[..]).into()
}

pub fn user_initials(full_name: &str) -> String {
    let names: Vec<&str> = full_name.split_whitespace().collect();
    match names.as_slice() {
        [] => "U".to_string(),
        [only] => only.chars().take(2).collect::<String>().to_uppercase(),
        [first, .., last] => first
            .chars()
            .take(1)
            .chain(last.chars().take(1))
            .collect::<String>()
            .to_uppercase(),
    }
}
