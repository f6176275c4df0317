//! Redis service holding the refresh-token revocation list

use async_trait::async_trait;
use redis::{AsyncCommands, Client};

use crate::error::{AppError, AppResult};

use super::tokens::TokenBlacklist;

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    /// Create a new Redis service
    pub async fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        // Test connection
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to connect to Redis: {}", e)))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;

        Ok(Self { client })
    }

    fn blacklist_key(jti: &str) -> String {
        format!("token:blacklist:{}", jti)
    }
}

#[async_trait]
impl TokenBlacklist for RedisService {
    async fn revoke(&self, jti: &str, ttl_seconds: u64) -> AppResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // SET NX replies nil when the key already exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(Self::blacklist_key(jti))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn is_revoked(&self, jti: &str) -> AppResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let revoked: bool = conn.exists(Self::blacklist_key(jti)).await?;
        Ok(revoked)
    }
}
