//! JWT access/refresh tokens and the refresh-token revocation list

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{TokenPair, TokenType, User, UserClaims},
};

/// Revoked refresh tokens, keyed by `jti`
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Revoke a token id for `ttl_seconds` (the token's remaining lifetime)
    ///
    /// Check-and-set in one step: returns `false` when the id was already
    /// revoked.
    async fn revoke(&self, jti: &str, ttl_seconds: u64) -> AppResult<bool>;

    async fn is_revoked(&self, jti: &str) -> AppResult<bool>;
}

/// Process-local revocation list, used when running without Redis
#[derive(Default)]
pub struct InMemoryBlacklist {
    // jti -> unix timestamp after which the entry can be forgotten
    entries: Mutex<HashMap<String, i64>>,
}

#[async_trait]
impl TokenBlacklist for InMemoryBlacklist {
    async fn revoke(&self, jti: &str, ttl_seconds: u64) -> AppResult<bool> {
        let now = Utc::now().timestamp();
        let mut entries = self.entries.lock();
        entries.retain(|_, expires_at| *expires_at > now);
        if entries.contains_key(jti) {
            return Ok(false);
        }
        entries.insert(jti.to_string(), now + ttl_seconds as i64);
        Ok(true)
    }

    async fn is_revoked(&self, jti: &str) -> AppResult<bool> {
        let now = Utc::now().timestamp();
        Ok(self
            .entries
            .lock()
            .get(jti)
            .map_or(false, |expires_at| *expires_at > now))
    }
}

#[derive(Clone)]
pub struct TokenService {
    config: AuthConfig,
    blacklist: Arc<dyn TokenBlacklist>,
}

impl TokenService {
    pub fn new(config: AuthConfig, blacklist: Arc<dyn TokenBlacklist>) -> Self {
        Self { config, blacklist }
    }

    fn claims_for(&self, user: &User, token_type: TokenType) -> UserClaims {
        let now = Utc::now();
        let lifetime = match token_type {
            TokenType::Access => Duration::minutes(self.config.access_token_minutes),
            TokenType::Refresh => Duration::days(self.config.refresh_token_days),
        };

        UserClaims {
            token_type,
            jti: Uuid::new_v4().to_string(),
            user_id: user.id,
            username: user.username.clone(),
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
        }
    }

    fn encode(&self, claims: &UserClaims) -> AppResult<String> {
        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Issue a short-lived access token
    pub fn issue_access(&self, user: &User) -> AppResult<String> {
        self.encode(&self.claims_for(user, TokenType::Access))
    }

    /// Issue a fresh access/refresh pair
    pub fn issue_pair(&self, user: &User) -> AppResult<TokenPair> {
        Ok(TokenPair {
            access: self.issue_access(user)?,
            refresh: self.encode(&self.claims_for(user, TokenType::Refresh))?,
        })
    }

    /// Decode a token and check its type; the error carries the reason
    fn decode(&self, token: &str, expected: TokenType) -> Result<UserClaims, String> {
        let claims = UserClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|e| format!("Token is invalid or expired: {}", e))?;

        if claims.token_type != expected {
            return Err("Token has wrong type".to_string());
        }
        Ok(claims)
    }

    /// Validate a bearer access token
    pub fn decode_access(&self, token: &str) -> AppResult<UserClaims> {
        self.decode(token, TokenType::Access)
            .map_err(AppError::Authentication)
    }

    /// Validate a refresh token that has not been revoked
    pub async fn decode_refresh(&self, token: &str) -> AppResult<UserClaims> {
        let claims = self
            .decode(token, TokenType::Refresh)
            .map_err(AppError::Authentication)?;

        if self.blacklist.is_revoked(&claims.jti).await? {
            return Err(AppError::Authentication("Token is blacklisted".to_string()));
        }
        Ok(claims)
    }

    /// Revoke a refresh token for the rest of its lifetime
    pub async fn revoke_refresh(&self, token: &str) -> AppResult<UserClaims> {
        let claims = self
            .decode(token, TokenType::Refresh)
            .map_err(AppError::Validation)?;

        let remaining = (claims.exp - Utc::now().timestamp()).max(1) as u64;
        if !self.blacklist.revoke(&claims.jti, remaining).await? {
            return Err(AppError::Validation("Token is blacklisted".to_string()));
        }
        Ok(claims)
    }
}
