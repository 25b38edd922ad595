use std::time::Duration;

use deadpool_redis::redis::{AsyncCommands, RedisError};
use deadpool_redis::{Connection, Pool};

use crate::domain::repository::KeyValueStore;
use crate::error::PaymentServiceError;

/// Redis-backed `KeyValueStore` over a shared connection pool.
#[derive(Clone)]
pub struct RedisStore {
    pub pool: Pool,
}

impl RedisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<Connection, PaymentServiceError> {
        self.pool
            .get()
            .await
            .map_err(|e| PaymentServiceError::StoreUnavailable(e.into()))
    }
}

fn unavailable(e: RedisError) -> PaymentServiceError {
    PaymentServiceError::StoreUnavailable(e.into())
}

/// Redis expiries are whole seconds; round sub-second durations up so a short
/// TTL never turns into "expire immediately".
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}

impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PaymentServiceError> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(unavailable)?;
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), PaymentServiceError> {
        let mut conn = self.conn().await?;
        match ttl {
            Some(ttl) => {
                let (): () = conn
                    .set_ex(key, value, ttl_secs(ttl))
                    .await
                    .map_err(unavailable)?;
            }
            None => {
                let (): () = conn.set(key, value).await.map_err(unavailable)?;
            }
        }
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, PaymentServiceError> {
        let mut conn = self.conn().await?;
        let count: i64 = conn.incr(key, 1).await.map_err(unavailable)?;
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), PaymentServiceError> {
        let mut conn = self.conn().await?;
        let _: bool = conn
            .expire(key, ttl_secs(ttl) as i64)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
