//! Admin authentication: password hashing, session tokens, and the
//! first-run bootstrap account.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use repodex_shared::{Admin, RepodexError, Result};
use repodex_storage::Storage;

/// Hash a password with SHA-256, returning lowercase hex.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Check a plaintext password against a stored hash.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    hash_password(password) == password_hash
}

/// JWT claims carried by a session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Admin username.
    pub sub: String,
    /// Expiry as a Unix timestamp.
    pub exp: i64,
}

/// Create a signed session token for `username`, expiring after
/// `ttl_minutes`.
pub fn create_access_token(username: &str, secret: &str, ttl_minutes: i64) -> Result<String> {
    let claims = Claims {
        sub: username.to_string(),
        exp: (Utc::now() + chrono::Duration::minutes(ttl_minutes)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| RepodexError::auth(format!("failed to sign token: {e}")))
}

/// Verify a session token and return the username it was issued for.
/// Expired and tampered tokens are rejected alike.
pub fn verify_access_token(token: &str, secret: &str) -> Result<String> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| RepodexError::auth("invalid or expired session"))?;

    Ok(data.claims.sub)
}

/// Check admin credentials against storage.
pub async fn authenticate(storage: &Storage, username: &str, password: &str) -> Result<Admin> {
    let admin = storage.get_admin_by_username(username).await?;

    match admin {
        Some(admin) if verify_password(password, &admin.password_hash) => Ok(admin),
        _ => Err(RepodexError::auth("incorrect username or password")),
    }
}

/// Create the initial admin account if no accounts exist yet.
/// Returns `true` if an account was created.
pub async fn bootstrap_admin(storage: &Storage, username: &str, password: &str) -> Result<bool> {
    if storage.count_admins().await? > 0 {
        return Ok(false);
    }

    storage
        .insert_admin(username, &hash_password(password))
        .await?;
    tracing::info!(username, "created initial admin account");
    Ok(true)
}
