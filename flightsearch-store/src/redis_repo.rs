use async_trait::async_trait;
use flightsearch_core::repository::InputPreferences;
use redis::{AsyncCommands, RedisResult};
use std::error::Error;
use tracing::debug;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn get_string(&self, key: &str) -> RedisResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.get(key).await
    }

    pub async fn set_string(&self, key: &str, value: &str) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set(key, value).await
    }
}

/// Last typed search text, kept under a single Redis key.
pub struct RedisInputPreferences {
    redis: RedisClient,
    key: String,
}

impl RedisInputPreferences {
    pub fn new(redis: RedisClient, key: impl Into<String>) -> Self {
        Self { redis, key: key.into() }
    }
}

#[async_trait]
impl InputPreferences for RedisInputPreferences {
    async fn get(&self) -> Result<String, Box<dyn Error + Send + Sync>> {
        let text = self.redis.get_string(&self.key).await?;
        Ok(text.unwrap_or_default())
    }

    async fn set(&self, text: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.redis.set_string(&self.key, text).await?;
        debug!("Saved search text under {}", self.key);
        Ok(())
    }
}
