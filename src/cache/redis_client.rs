//! Redis access
//!
//! A thin handle over `redis::aio::ConnectionManager`, which already owns
//! reconnection. Each command gets at most one re-issue after a short pause
//! when the failure looks like a dropped connection; protocol errors surface
//! immediately.

#![allow(dead_code)]
use redis::aio::ConnectionManager;
use redis::{Client, Cmd, FromRedisValue, RedisError};
use std::time::Duration;

const REISSUE_PAUSE: Duration = Duration::from_millis(120);

fn worth_reissuing(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_timeout()
}

pub struct RedisHandle {
    url: String,
    manager: ConnectionManager,
}

impl RedisHandle {
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        tracing::info!("connecting to Redis at {url}");
        let manager = ConnectionManager::new(Client::open(url)?).await?;
        Ok(Self {
            url: url.to_string(),
            manager,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue a command; on a connection-level failure, pause briefly and issue
    /// it once more (the manager reconnects underneath).
    async fn run<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T, RedisError> {
        let mut conn = self.manager.clone();
        match cmd.query_async(&mut conn).await {
            Ok(value) => Ok(value),
            Err(first) if worth_reissuing(&first) => {
                tracing::warn!("redis command failed, reissuing once: {first}");
                tokio::time::sleep(REISSUE_PAUSE).await;
                let mut conn = self.manager.clone();
                cmd.query_async(&mut conn).await
            }
            Err(other) => Err(other),
        }
    }

    // ==================== Strings ====================

    pub async fn get_string(&self, key: &str) -> Result<Option<String>, RedisError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.run(&cmd).await
    }

    /// SET with expiry in one round trip.
    pub async fn put_string(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), RedisError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("EX").arg(ttl_secs);
        self.run(&cmd).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, RedisError> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let removed: i64 = self.run(&cmd).await?;
        Ok(removed > 0)
    }

    // ==================== Sorted Sets ====================

    /// ZINCRBY; returns the member's new score.
    pub async fn zincr(&self, key: &str, member: &str, delta: f64) -> Result<f64, RedisError> {
        let mut cmd = redis::cmd("ZINCRBY");
        cmd.arg(key).arg(delta).arg(member);
        self.run(&cmd).await
    }

    /// ZREVRANGE WITHSCORES over [start, stop].
    pub async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, RedisError> {
        let mut cmd = redis::cmd("ZREVRANGE");
        cmd.arg(key).arg(start).arg(stop).arg("WITHSCORES");
        self.run(&cmd).await
    }

    /// ZUNIONSTORE dst 1 src WEIGHTS w; returns the destination cardinality.
    pub async fn zunionstore_weighted(
        &self,
        dst: &str,
        src: &str,
        weight: f64,
    ) -> Result<i64, RedisError> {
        let mut cmd = redis::cmd("ZUNIONSTORE");
        cmd.arg(dst).arg(1).arg(src).arg("WEIGHTS").arg(weight);
        self.run(&cmd).await
    }

    // ==================== Expiry ====================

    /// TTL in seconds; -1 when the key has no expiry, -2 when it is absent.
    pub async fn ttl(&self, key: &str) -> Result<i64, RedisError> {
        let mut cmd = redis::cmd("TTL");
        cmd.arg(key);
        self.run(&cmd).await
    }

    pub async fn expire(&self, key: &str, ttl_secs: i64) -> Result<bool, RedisError> {
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(ttl_secs);
        self.run(&cmd).await
    }

    // ==================== Scripting ====================

    /// EVAL a Lua script that takes one non-key argument and returns a count.
    /// Used by the scan-based cache eviction.
    pub async fn eval_count(&self, script_src: &str, arg: &str) -> Result<i64, RedisError> {
        let mut cmd = redis::cmd("EVAL");
        cmd.arg(script_src).arg(0).arg(arg);
        self.run(&cmd).await
    }

    // ==================== Health ====================

    pub async fn is_available(&self) -> bool {
        let pong: Result<String, _> = self.run(&redis::cmd("PING")).await;
        matches!(pong.as_deref(), Ok("PONG"))
    }
}
