//! Account authentication and token issuance.
//!
//! Passwords and tokens are only kept as SHA-256 hashes. Tokens are handed
//! out by `/management/auth` and expire after the configured TTL.

use crate::config::{AccountConfig, AuthConfig, Permission};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The `Authorization` header could not be read.
    #[error("{0}")]
    InvalidAuthHeader(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token expired")]
    TokenExpired,
}

/// Credentials presented with a request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Basic { username: String, password: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Bearer(_) => f.write_str("Bearer(..)"),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

/// Parses an `Authorization` header value.
///
/// Accepts `Bearer <token>` and `Basic <base64(username:password)>`. The
/// scheme name is case-insensitive.
pub fn parse_authorization_header(value: &str) -> Result<Credentials, AuthError> {
    let value = value.trim();
    let (scheme, rest) = value.split_once(char::is_whitespace).unwrap_or((value, ""));
    let rest = rest.trim();

    if scheme.eq_ignore_ascii_case("bearer") {
        if rest.is_empty() {
            return Err(AuthError::InvalidAuthHeader(
                "Missing Bearer token".to_string(),
            ));
        }
        Ok(Credentials::Bearer(rest.to_string()))
    } else if scheme.eq_ignore_ascii_case("basic") {
        let (username, password) = parse_basic_auth_token(rest)?;
        Ok(Credentials::Basic { username, password })
    } else {
        Err(AuthError::InvalidAuthHeader(format!(
            "Unsupported authorization scheme '{}'",
            scheme
        )))
    }
}

/// Decodes the token part of a basic auth header into username and password.
///
/// The password may contain `:`; only the first one separates the fields.
pub fn parse_basic_auth_token(token: &str) -> Result<(String, String), AuthError> {
    let decoded = STANDARD
        .decode(token.trim())
        .map_err(|_| {
            AuthError::InvalidAuthHeader("Can't decode Basic Auth header value".to_string())
        })?;
    let value = String::from_utf8(decoded)
        .map_err(|_| AuthError::InvalidAuthHeader("Invalid Basic Auth header value".to_string()))?;

    match value.split_once(':') {
        Some((username, password)) => Ok((username.to_string(), password.to_string())),
        None => Err(AuthError::InvalidAuthHeader(
            "Invalid Basic Auth header value".to_string(),
        )),
    }
}

/// Hashes a secret using SHA-256, returning a lowercase hex string.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// An authenticated account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub is_admin: bool,
    pub permissions: BTreeMap<String, Permission>,
}

impl Account {
    pub fn can_read(&self, collection: &str) -> bool {
        self.is_admin || self.permissions.contains_key(collection)
    }

    pub fn can_modify(&self, collection: &str) -> bool {
        self.is_admin || self.permissions.get(collection) == Some(&Permission::Modify)
    }
}

#[derive(Debug)]
struct StoredAccount {
    account: Account,
    password_hash: String,
}

#[derive(Debug, Clone)]
struct IssuedToken {
    username: String,
    expires_at: DateTime<Utc>,
}

/// Checks credentials against configured accounts and tracks issued tokens.
#[derive(Debug)]
pub struct AuthManager {
    accounts: HashMap<String, StoredAccount>,
    /// Issued tokens keyed by their hash.
    tokens: DashMap<String, IssuedToken>,
    token_ttl: Duration,
}

impl AuthManager {
    /// Creates a manager with no accounts.
    pub fn new(token_ttl_secs: u64) -> Self {
        Self {
            accounts: HashMap::new(),
            tokens: DashMap::new(),
            token_ttl: Duration::seconds(token_ttl_secs.min(u64::from(u32::MAX)) as i64),
        }
    }

    /// Creates a manager holding the configured accounts.
    pub fn from_config(config: &AuthConfig) -> Self {
        let mut manager = Self::new(config.token_ttl_secs);
        for account in &config.accounts {
            manager.add_account(account);
        }
        manager
    }

    /// Registers an account, replacing one with the same username.
    pub fn add_account(&mut self, config: &AccountConfig) {
        let password_hash = match (&config.password, &config.password_hash) {
            (_, Some(hash)) => hash.to_lowercase(),
            (Some(password), None) => hash_secret(password),
            (None, None) => {
                tracing::warn!("Account '{}' has no password, skipping", config.username);
                return;
            }
        };

        let account = Account {
            username: config.username.clone(),
            is_admin: config.is_admin,
            permissions: config.permissions.clone(),
        };
        self.accounts.insert(
            config.username.clone(),
            StoredAccount {
                account,
                password_hash,
            },
        );
    }

    /// Returns the number of configured accounts.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Returns the number of live tokens.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Resolves credentials to an account.
    pub fn authenticate(&self, credentials: &Credentials) -> Result<Account, AuthError> {
        match credentials {
            Credentials::Basic { username, password } => {
                self.check_password(username, password).cloned()
            }
            Credentials::Bearer(token) => {
                let hash = hash_secret(token);
                let issued = self
                    .tokens
                    .get(&hash)
                    .map(|entry| entry.value().clone())
                    .ok_or(AuthError::InvalidCredentials)?;

                if issued.expires_at <= Utc::now() {
                    self.tokens.remove(&hash);
                    return Err(AuthError::TokenExpired);
                }

                self.accounts
                    .get(&issued.username)
                    .map(|stored| stored.account.clone())
                    .ok_or(AuthError::InvalidCredentials)
            }
        }
    }

    /// Checks a username and password and issues a new bearer token.
    pub fn issue_token(&self, username: &str, password: &str) -> Result<String, AuthError> {
        self.check_password(username, password)?;

        let token = uuid::Uuid::new_v4().to_string();
        self.tokens.insert(
            hash_secret(&token),
            IssuedToken {
                username: username.to_string(),
                expires_at: Utc::now() + self.token_ttl,
            },
        );
        tracing::debug!("Issued token for '{}'", username);
        Ok(token)
    }

    /// Drops expired tokens, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.tokens.len();
        self.tokens.retain(|_, issued| issued.expires_at > now);
        before - self.tokens.len()
    }

    fn check_password(&self, username: &str, password: &str) -> Result<&Account, AuthError> {
        let stored = self
            .accounts
            .get(username)
            .ok_or(AuthError::InvalidCredentials)?;
        let matches: bool = stored
            .password_hash
            .as_bytes()
            .ct_eq(hash_secret(password).as_bytes())
            .into();
        if matches {
            Ok(&stored.account)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}
