use std::sync::LazyLock;

use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use regex::Regex;
use tracing::{debug, info};

use bazaar_db::{Database, users};
use bazaar_types::models::User;

use crate::error::{ApiError, ApiResult};

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email regex compiles")
});

/// Account registration and lookup. Authentication itself happens at the
/// HTTP boundary; this only answers "who is this" and "does this password match".
pub struct Directory<'a> {
    db: &'a Database,
}

impl<'a> Directory<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn register(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        raw_password: &str,
    ) -> ApiResult<User> {
        if first_name.trim().is_empty() || last_name.trim().is_empty() {
            return Err(ApiError::Validation("First and last name are mandatory".into()));
        }
        if raw_password.is_empty() {
            return Err(ApiError::Validation("Password is mandatory".into()));
        }

        if self.db.get_user_by_email(email)?.is_some() {
            return Err(ApiError::DuplicateEmail);
        }
        if !is_valid_email(email) {
            return Err(ApiError::InvalidEmail);
        }

        let password_hash = hash_password(raw_password)?;

        // Re-check under the transaction: another registration may have
        // claimed the address while we were hashing.
        let user = self.db.transaction(|tx| {
            if users::user_by_email(tx, email)?.is_some() {
                return Err(ApiError::DuplicateEmail);
            }
            let id = users::insert_user(tx, first_name, last_name, email, &password_hash)?;
            users::user_by_id(tx, id)?
                .map(User::from)
                .ok_or_else(|| ApiError::Store(anyhow!("user {} vanished after insert", id)))
        })?;

        info!("Registered user {} <{}>", user.id, user.email);
        Ok(user)
    }

    pub fn find_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        Ok(self.db.get_user_by_email(email)?.map(User::from))
    }

    pub fn find_by_id(&self, id: i64) -> ApiResult<Option<User>> {
        Ok(self.db.get_user_by_id(id)?.map(User::from))
    }

    /// `None` for an unknown email or a wrong password; callers must not
    /// tell the two apart.
    pub fn verify_credentials(&self, email: &str, raw_password: &str) -> ApiResult<Option<User>> {
        let Some(row) = self.db.get_user_by_email(email)? else {
            debug!("Login attempt for unknown email");
            return Ok(None);
        };

        let parsed_hash = PasswordHash::new(&row.password)
            .map_err(|e| anyhow!("corrupt password hash for user {}: {}", row.id, e))?;

        match Argon2::default().verify_password(raw_password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(Some(User::from(row))),
            Err(_) => {
                debug!("Password mismatch for user {}", row.id);
                Ok(None)
            }
        }
    }

    /// Remove an account together with its products and every message it
    /// took part in.
    pub fn delete_account(&self, id: i64) -> ApiResult<()> {
        if !self.db.delete_user(id)? {
            return Err(ApiError::NotFound("User"));
        }
        Ok(())
    }
}

fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

fn hash_password(raw_password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(raw_password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}
