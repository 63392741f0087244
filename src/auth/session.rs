//! Session store: `session id -> user id` entries that expire on their own.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::info;

use crate::config::CacheConfig;
use crate::error::SessionError;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stores `session_id -> user_id`, replacing any previous value, for `ttl`.
    async fn set(&self, session_id: &str, user_id: &str, ttl: Duration) -> Result<(), SessionError>;

    /// Owner of a live session. Expired and unknown ids both yield `None`.
    async fn get(&self, session_id: &str) -> Result<Option<String>, SessionError>;

    /// Returns whether a live entry was removed.
    async fn delete(&self, session_id: &str) -> Result<bool, SessionError>;
}

/// Redis-backed store. Commands are bounded by the configured timeout.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    timeout: Duration,
    key_prefix: String,
}

impl RedisSessionStore {
    pub async fn connect(config: &CacheConfig) -> Result<Self, SessionError> {
        let client = redis::Client::open(config.url.as_str())?;
        let timeout = config.timeout();

        let conn = match tokio::time::timeout(timeout, ConnectionManager::new(client)).await {
            Ok(conn) => conn?,
            Err(_) => return Err(SessionError::Timeout(timeout)),
        };

        let store = Self {
            conn,
            timeout,
            key_prefix: config.key_prefix.clone(),
        };

        let mut conn = store.conn.clone();
        let ping = redis::cmd("PING");
        let pong: String = store.bounded(ping.query_async(&mut conn)).await?;
        info!("Session store reachable ({})", pong);

        Ok(store)
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.key_prefix, session_id)
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, SessionError> {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => result.map_err(SessionError::from),
            Err(_) => Err(SessionError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn set(&self, session_id: &str, user_id: &str, ttl: Duration) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(session_id))
            .arg(user_id)
            .arg("EX")
            .arg(ttl.as_secs().max(1));
        self.bounded(cmd.query_async::<_, ()>(&mut conn)).await
    }

    async fn get(&self, session_id: &str) -> Result<Option<String>, SessionError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("GET");
        cmd.arg(self.key(session_id));
        self.bounded(cmd.query_async::<_, Option<String>>(&mut conn)).await
    }

    async fn delete(&self, session_id: &str) -> Result<bool, SessionError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("DEL");
        cmd.arg(self.key(session_id));
        let removed: i64 = self.bounded(cmd.query_async(&mut conn)).await?;
        Ok(removed > 0)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    user_id: String,
    expires_at: Instant,
}

/// Map size at which `set` also drops expired entries.
const SWEEP_THRESHOLD: usize = 1024;

fn sweep(entries: &mut HashMap<String, Entry>) {
    let now = Instant::now();
    entries.retain(|_, entry| entry.expires_at > now);
}

/// In-process store with lazily enforced TTLs.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired entry.
    pub async fn cleanup(&self) {
        sweep(&mut *self.entries.write().await);
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn set(&self, session_id: &str, user_id: &str, ttl: Duration) -> Result<(), SessionError> {
        let entry = Entry {
            user_id: user_id.to_string(),
            expires_at: Instant::now() + ttl,
        };
        let mut entries = self.entries.write().await;
        entries.insert(session_id.to_string(), entry);
        if entries.len() >= SWEEP_THRESHOLD {
            sweep(&mut entries);
        }
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<String>, SessionError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(session_id)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.user_id.clone()))
    }

    async fn delete(&self, session_id: &str) -> Result<bool, SessionError> {
        let removed = self.entries.write().await.remove(session_id);
        Ok(removed.map_or(false, |entry| entry.expires_at > Instant::now()))
    }
}
