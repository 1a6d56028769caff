use std::{fmt::Display, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait,
    sea_query::OnConflict,
};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{
    entities::cache_entry,
    error::{AppError, AppResult},
};

/// Key-value store holding advisory JSON blobs with a TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
    async fn delete_prefix(&self, prefix: &str) -> anyhow::Result<()>;
    /// Get and delete in one step; a key can be taken at most once.
    async fn take(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn purge_expired(&self) -> anyhow::Result<u64>;
}

#[derive(Clone)]
pub struct SqlCacheStore {
    db: DatabaseConnection,
}

impl SqlCacheStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CacheStore for SqlCacheStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entry = cache_entry::Entity::find_by_id(key.to_string()).one(&self.db).await?;
        Ok(entry.filter(|e| is_fresh(e.expires_at)).map(|e| e.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
        let model = cache_entry::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value),
            expires_at: Set(now_sec().saturating_add(ttl.as_secs() as i64)),
        };

        cache_entry::Entity::insert(model)
            .on_conflict(
                OnConflict::column(cache_entry::Column::Key)
                    .update_columns([cache_entry::Column::Value, cache_entry::Column::ExpiresAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        cache_entry::Entity::delete_by_id(key.to_string()).exec(&self.db).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> anyhow::Result<()> {
        let res = cache_entry::Entity::delete_many()
            .filter(cache_entry::Column::Key.starts_with(prefix))
            .exec(&self.db)
            .await?;
        debug!(prefix = %prefix, removed = res.rows_affected, "cache prefix dropped");
        Ok(())
    }

    async fn take(&self, key: &str) -> anyhow::Result<Option<String>> {
        let txn = self.db.begin().await?;
        let entry = cache_entry::Entity::find_by_id(key.to_string()).one(&txn).await?;
        let res = cache_entry::Entity::delete_by_id(key.to_string()).exec(&txn).await?;
        txn.commit().await?;

        // a concurrent taker may have removed the row between our read and delete
        if res.rows_affected == 0 {
            return Ok(None);
        }
        Ok(entry.filter(|e| is_fresh(e.expires_at)).map(|e| e.value))
    }

    async fn purge_expired(&self) -> anyhow::Result<u64> {
        let res = cache_entry::Entity::delete_many()
            .filter(cache_entry::Column::ExpiresAt.lte(now_sec()))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }
}

fn is_fresh(expires_at: i64) -> bool {
    expires_at > now_sec()
}

pub fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}

/// Typed front for a [`CacheStore`]. Values are always stored as a JSON array, single
/// entities as an array of one. Every store failure or timeout is logged and degrades to
/// a miss (reads) or a no-op (writes, invalidation).
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
    timeout: Duration,
    entity_ttl: Duration,
    list_ttl: Duration,
}

impl Cache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        timeout: Duration,
        entity_ttl: Duration,
        list_ttl: Duration,
    ) -> Self {
        Self { store, timeout, entity_ttl, list_ttl }
    }

    pub async fn get_list<T: DeserializeOwned>(&self, key: &str) -> Option<Vec<T>> {
        let raw = self.call("get", key, self.store.get(key)).await.flatten()?;
        match serde_json::from_str(&raw) {
            Ok(items) => {
                debug!(key = %key, "cache hit");
                Some(items)
            },
            Err(err) => {
                warn!(key = %key, error = %err, "dropping undecodable cache entry");
                self.invalidate(&[key]).await;
                None
            },
        }
    }

    pub async fn get_one<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut items = self.get_list::<T>(key).await?;
        if items.len() != 1 {
            return None;
        }
        items.pop()
    }

    pub async fn put_list<T: Serialize>(&self, key: &str, items: &[T]) {
        self.put(key, items, self.list_ttl).await;
    }

    pub async fn put_one<T: Serialize>(&self, key: &str, item: &T) {
        self.put(key, std::slice::from_ref(item), self.entity_ttl).await;
    }

    async fn put<T: Serialize>(&self, key: &str, items: &[T], ttl: Duration) {
        match serde_json::to_string(items) {
            Ok(raw) => {
                self.call("set", key, self.store.set(key, raw, ttl)).await;
            },
            Err(err) => warn!(key = %key, error = %err, "cache value not serializable"),
        }
    }

    pub async fn invalidate(&self, keys: &[&str]) {
        for key in keys {
            self.call("delete", key, self.store.delete(key)).await;
        }
    }

    pub async fn invalidate_prefix(&self, prefix: &str) {
        self.call("delete_prefix", prefix, self.store.delete_prefix(prefix)).await;
    }

    /// Drops expired entries; returns how many went, 0 when the store fails.
    pub async fn purge_expired(&self) -> u64 {
        self.call("purge_expired", "*", self.store.purge_expired()).await.unwrap_or(0)
    }

    /// Stores a single-use token; store failures surface as `UpstreamUnavailable`.
    pub async fn put_token(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        match tokio::time::timeout(self.timeout, self.store.set(key, value.to_string(), ttl)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                warn!(key = %key, error = %err, "token write failed");
                Err(AppError::UpstreamUnavailable("cache"))
            },
            Err(_) => {
                warn!(key = %key, "token write timed out");
                Err(AppError::UpstreamUnavailable("cache"))
            },
        }
    }

    pub async fn take_token(&self, key: &str) -> AppResult<Option<String>> {
        match tokio::time::timeout(self.timeout, self.store.take(key)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                warn!(key = %key, error = %err, "token read failed");
                Err(AppError::UpstreamUnavailable("cache"))
            },
            Err(_) => {
                warn!(key = %key, "token read timed out");
                Err(AppError::UpstreamUnavailable("cache"))
            },
        }
    }

    async fn call<T>(
        &self,
        op: &'static str,
        key: &str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                warn!(op, key = %key, error = %err, "cache call failed");
                None
            },
            Err(_) => {
                warn!(op, key = %key, "cache call timed out");
                None
            },
        }
    }
}

pub mod keys {
    use super::*;

    pub const FILM: &str = "film:";
    pub const FILMS: &str = "films:";
    pub const ACTOR: &str = "actor:";
    pub const ACTORS: &str = "actors:";
    pub const GENRES: &str = "genres";
    pub const REVIEW: &str = "review:";
    /// Covers every review list, including `reviews:all`.
    pub const REVIEWS: &str = "reviews:";
    pub const REVIEWS_ALL: &str = "reviews:all";
    pub const REVIEWS_BY_FILM: &str = "reviews:film:";
    pub const REVIEWS_BY_USER: &str = "reviews:user:";

    pub fn film(id: i32) -> String {
        format!("{FILM}{id}")
    }

    pub fn actor(id: i32) -> String {
        format!("{ACTOR}{id}")
    }

    pub fn genre(id: i32) -> String {
        format!("genre:{id}")
    }

    pub fn review(id: i32) -> String {
        format!("{REVIEW}{id}")
    }

    pub fn reviews_by_film(film_id: i32) -> String {
        format!("{REVIEWS_BY_FILM}{film_id}")
    }

    pub fn reviews_by_user(user_id: i32) -> String {
        format!("{REVIEWS_BY_USER}{user_id}")
    }

    pub fn oauth_state(state: &str) -> String {
        format!("oauth_state:{state}")
    }

    pub fn email_code(email: &str) -> String {
        format!("email_code:{}", email.to_lowercase())
    }

    /// Builds a list key from query fields in the order they are added. Empty fields are
    /// skipped; the rest are joined as `name=value&...` and hashed so the key length is
    /// bounded and user input cannot forge a delimiter.
    #[derive(Debug, Default)]
    pub struct ListKey {
        parts: Vec<String>,
    }

    impl ListKey {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn field(mut self, name: &str, value: impl Display) -> Self {
            let value = value.to_string();
            if !value.is_empty() {
                self.parts.push(format!("{name}={value}"));
            }
            self
        }

        pub fn opt(self, name: &str, value: Option<impl Display>) -> Self {
            match value {
                Some(v) => self.field(name, v),
                None => self,
            }
        }

        pub fn ids(self, name: &str, ids: &[i32]) -> Self {
            let joined = ids.iter().map(i32::to_string).collect::<Vec<_>>().join(",");
            self.field(name, joined)
        }

        pub fn finish(self, prefix: &str) -> String {
            let digest = Sha256::digest(self.parts.join("&").as_bytes());
            format!("{prefix}{}", hex::encode(digest))
        }
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicBool, Ordering},
        },
        time::Instant,
    };

    use super::*;

    /// In-process store; can be switched into a failing mode to simulate an outage.
    #[derive(Default)]
    pub struct MemoryCacheStore {
        entries: Mutex<HashMap<String, (String, Instant)>>,
        down: AtomicBool,
        stalled: AtomicBool,
    }

    impl MemoryCacheStore {
        pub fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        /// Makes every call hang until the caller's deadline fires.
        pub fn set_stalled(&self, stalled: bool) {
            self.stalled.store(stalled, Ordering::SeqCst);
        }

        pub fn contains(&self, key: &str) -> bool {
            self.entries.lock().unwrap().get(key).is_some_and(|(_, exp)| *exp > Instant::now())
        }

        pub fn keys(&self) -> Vec<String> {
            self.entries.lock().unwrap().keys().cloned().collect()
        }

        async fn check(&self) -> anyhow::Result<()> {
            if self.stalled.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            anyhow::ensure!(!self.down.load(Ordering::SeqCst), "cache store unreachable");
            Ok(())
        }
    }

    #[async_trait]
    impl CacheStore for MemoryCacheStore {
        async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.check().await?;
            let entries = self.entries.lock().unwrap();
            Ok(entries.get(key).filter(|(_, exp)| *exp > Instant::now()).map(|(v, _)| v.clone()))
        }

        async fn set(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
            self.check().await?;
            self.entries.lock().unwrap().insert(key.to_string(), (value, Instant::now() + ttl));
            Ok(())
        }

        async fn delete(&self, key: &str) -> anyhow::Result<()> {
            self.check().await?;
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }

        async fn delete_prefix(&self, prefix: &str) -> anyhow::Result<()> {
            self.check().await?;
            self.entries.lock().unwrap().retain(|k, _| !k.starts_with(prefix));
            Ok(())
        }

        async fn take(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.check().await?;
            let entry = self.entries.lock().unwrap().remove(key);
            Ok(entry.filter(|(_, exp)| *exp > Instant::now()).map(|(v, _)| v))
        }

        async fn purge_expired(&self) -> anyhow::Result<u64> {
            self.check().await?;
            let mut entries = self.entries.lock().unwrap();
            let before = entries.len();
            let now = Instant::now();
            entries.retain(|_, (_, exp)| *exp > now);
            Ok((before - entries.len()) as u64)
        }
    }

    pub fn cache(store: Arc<MemoryCacheStore>) -> Cache {
        Cache::new(store, Duration::from_millis(200), Duration::from_secs(60), Duration::from_secs(60))
    }
}
