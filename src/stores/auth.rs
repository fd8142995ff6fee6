//! Accounts and authentication.
//!
//! One authoritative record per user; login resolves by normalized email.
//! Passwords are stored as Argon2id PHC strings, verified in constant time.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::Config;
use crate::domain::aggregates::user::{User, UserRole};
use crate::domain::value_objects::Email;
use crate::storage::{keys, KvStore};
use crate::stores::ledger;
use crate::{Result, StoreError};

pub struct AuthStore {
    kv: Arc<KvStore>,
}

impl AuthStore {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    pub fn register(&self, name: &str, email: &str, password: &str) -> Result<User> {
        let name = name.trim();
        validate_name(name)?;
        let email = Email::parse(email)?;
        validate_password(password)?;

        let user = User {
            id: Uuid::now_v7(),
            name: name.to_string(),
            email: email.clone(),
            password_hash: hash_password(password)?,
            role: UserRole::User,
            created_at: Utc::now(),
            last_login: None,
            is_active: true,
        };

        self.kv.with(|txn| {
            let mut users: Vec<User> = txn.get(keys::USERS)?.unwrap_or_default();
            if users.iter().any(|u| u.email == email) {
                return Err(StoreError::Conflict(format!(
                    "an account already exists for {email}"
                )));
            }
            users.push(user.clone());
            txn.put(keys::USERS, &users)
        })?;

        tracing::info!(user = %user.id, "account registered");
        Ok(user)
    }

    /// Verify credentials and stamp `last_login`. Unknown email, wrong
    /// password and deactivated account all collapse into the same error.
    pub fn login(&self, email: &str, password: &str) -> Result<User> {
        let email = Email::parse(email)?;
        self.kv.with(|txn| {
            let mut users: Vec<User> = txn.get(keys::USERS)?.unwrap_or_default();
            let user = users
                .iter_mut()
                .find(|u| u.email == email)
                .ok_or(StoreError::Auth)?;
            if !user.is_active {
                return Err(StoreError::Auth);
            }
            verify_password(password, &user.password_hash)?;
            user.last_login = Some(Utc::now());
            let snapshot = user.clone();
            txn.put(keys::USERS, &users)?;
            Ok(snapshot)
        })
    }

    pub fn get(&self, id: Uuid) -> Result<User> {
        self.all_users()
            .into_iter()
            .find(|u| u.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    pub fn all_users(&self) -> Vec<User> {
        match self.kv.get(keys::USERS) {
            Ok(Some(users)) => users,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "users unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    pub fn balance(&self, user_id: Uuid) -> Result<Decimal> {
        self.kv.with(|txn| ledger::balance(txn, user_id))
    }

    /// First-run admin account. Skipped when no seed password is configured
    /// or the email is already taken.
    pub fn seed_admin(&self, config: &Config) -> Result<()> {
        let Some(password) = &config.admin_password else {
            return Ok(());
        };
        let email = Email::parse(&config.admin_email)?;
        let admin = User {
            id: Uuid::now_v7(),
            name: config.admin_name.clone(),
            email: email.clone(),
            password_hash: hash_password(password)?,
            role: UserRole::Admin,
            created_at: Utc::now(),
            last_login: None,
            is_active: true,
        };
        self.kv.with(|txn| {
            let mut users: Vec<User> = txn.get(keys::USERS)?.unwrap_or_default();
            if users.iter().any(|u| u.email == email) {
                return Ok(());
            }
            tracing::info!(email = %email, "seeding admin account");
            users.push(admin);
            txn.put(keys::USERS, &users)
        })
    }
}

fn validate_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if !(2..=50).contains(&len) {
        return Err(StoreError::Validation(
            "name must be 2 to 50 characters".into(),
        ));
    }
    if !name.chars().all(|c| c.is_alphabetic() || c == ' ') {
        return Err(StoreError::Validation(
            "name may only contain letters and spaces".into(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    let long_enough = password.chars().count() >= 8;
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(long_enough && has_upper && has_lower && has_digit) {
        return Err(StoreError::Validation(
            "password must be at least 8 characters with upper, lower and digit".into(),
        ));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Storage(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, hash: &str) -> Result<()> {
    let parsed = PasswordHash::new(hash).map_err(|_| StoreError::Auth)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| StoreError::Auth)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, AuthStore) {
        let dir = tempfile::tempdir().unwrap();
        let kv = Arc::new(KvStore::open(dir.path()).unwrap());
        (dir, AuthStore::new(kv))
    }

    #[test]
    fn test_register_then_login() {
        let (_dir, auth) = open();
        let user = auth
            .register("Ayşe Yılmaz", "Ayse@Example.com", "Sifre123x")
            .unwrap();
        assert!(user.password_hash.starts_with("$argon2id$"));
        assert_eq!(user.email.as_str(), "ayse@example.com");

        // Email lookup is case-insensitive through normalization.
        let logged_in = auth.login("AYSE@example.COM", "Sifre123x").unwrap();
        assert_eq!(logged_in.id, user.id);
        assert!(logged_in.last_login.is_some());
    }

    #[test]
    fn test_wrong_password_rejected() {
        let (_dir, auth) = open();
        auth.register("Ayşe Yılmaz", "ayse@example.com", "Sifre123x")
            .unwrap();
        assert!(matches!(
            auth.login("ayse@example.com", "wrong-Pass1"),
            Err(StoreError::Auth)
        ));
        assert!(matches!(
            auth.login("nobody@example.com", "Sifre123x"),
            Err(StoreError::Auth)
        ));
    }

    #[test]
    fn test_duplicate_email_conflict() {
        let (_dir, auth) = open();
        auth.register("Ayşe Yılmaz", "ayse@example.com", "Sifre123x")
            .unwrap();
        let again = auth.register("Başka Biri", "AYSE@example.com", "Digeri99z");
        assert!(matches!(again, Err(StoreError::Conflict(_))));
        assert_eq!(auth.all_users().len(), 1);
    }

    #[test]
    fn test_weak_inputs_rejected() {
        let (_dir, auth) = open();
        assert!(auth.register("A", "a@example.com", "Sifre123x").is_err());
        assert!(auth
            .register("Ayşe 99", "a@example.com", "Sifre123x")
            .is_err());
        assert!(auth
            .register("Ayşe Yılmaz", "not-an-email", "Sifre123x")
            .is_err());
        for weak in ["kisa1A", "nodigitsX", "NOLOWER99", "noupper99"] {
            assert!(auth.register("Ayşe Yılmaz", "a@example.com", weak).is_err());
        }
    }

    #[test]
    fn test_admin_seed_is_idempotent() {
        let (_dir, auth) = open();
        let mut config = Config::from_env();
        config.admin_password = Some("Yonetici1x".into());
        config.admin_email = "admin@example.com".into();

        auth.seed_admin(&config).unwrap();
        auth.seed_admin(&config).unwrap();

        let users = auth.all_users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].role, UserRole::Admin);

        // Without a seed password nothing happens.
        let (_dir2, fresh) = open();
        config.admin_password = None;
        fresh.seed_admin(&config).unwrap();
        assert!(fresh.all_users().is_empty());
    }
}
