use std::{collections::HashMap, num::NonZeroU32, sync::Arc, time::Duration};

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

const MAX_HITS: usize = 50;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilmDoc {
    pub id: i32,
    pub title: String,
    pub synopsis: String,
    pub producer: String,
    pub release_date: String,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn index_film(&self, doc: &FilmDoc) -> anyhow::Result<()>;
    async fn delete_film(&self, id: i32) -> anyhow::Result<()>;
    /// Ids of matching films, best match first.
    async fn search(&self, query: &str) -> anyhow::Result<Vec<i32>>;
}

/// Elasticsearch over its REST API.
pub struct ElasticIndex {
    client: reqwest::Client,
    base_url: String,
    index: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl ElasticIndex {
    pub fn new(client: reqwest::Client, base_url: String, index: String, rps: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN));
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    fn doc_url(&self, id: i32) -> String {
        format!("{}/{}/_doc/{id}", self.base_url, self.index)
    }
}

#[async_trait]
impl SearchIndex for ElasticIndex {
    async fn index_film(&self, doc: &FilmDoc) -> anyhow::Result<()> {
        self.limiter.until_ready().await;
        self.client.put(self.doc_url(doc.id)).json(doc).send().await?.error_for_status()?;
        debug!(film_id = doc.id, "film indexed");
        Ok(())
    }

    async fn delete_film(&self, id: i32) -> anyhow::Result<()> {
        self.limiter.until_ready().await;
        let resp = self.client.delete(self.doc_url(id)).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        resp.error_for_status()?;
        Ok(())
    }

    async fn search(&self, query: &str) -> anyhow::Result<Vec<i32>> {
        self.limiter.until_ready().await;

        let url = format!("{}/{}/_search", self.base_url, self.index);
        let body = serde_json::json!({
            "size": MAX_HITS,
            "_source": false,
            "query": {
                "multi_match": {
                    "query": query,
                    "fields": ["title^2", "synopsis", "producer"],
                }
            }
        });

        let resp: SearchResponse =
            self.client.post(url).json(&body).send().await?.error_for_status()?.json().await?;

        Ok(resp.hits.hits.into_iter().filter_map(|h| h.id.parse().ok()).collect())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
}

/// In-process index used when no search cluster is configured. Rebuilt from the database
/// at startup.
#[derive(Default)]
pub struct MemoryIndex {
    docs: RwLock<HashMap<i32, FilmDoc>>,
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn index_film(&self, doc: &FilmDoc) -> anyhow::Result<()> {
        self.docs.write().await.insert(doc.id, doc.clone());
        Ok(())
    }

    async fn delete_film(&self, id: i32) -> anyhow::Result<()> {
        self.docs.write().await.remove(&id);
        Ok(())
    }

    async fn search(&self, query: &str) -> anyhow::Result<Vec<i32>> {
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let docs = self.docs.read().await;
        let mut scored: Vec<(usize, i32)> = docs
            .values()
            .filter_map(|doc| {
                let title = doc.title.to_lowercase();
                let rest = format!("{} {}", doc.synopsis, doc.producer).to_lowercase();
                let score = terms
                    .iter()
                    .map(|t| if title.contains(t.as_str()) { 2 } else { usize::from(rest.contains(t.as_str())) })
                    .sum::<usize>();
                (score > 0).then_some((score, doc.id))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        Ok(scored.into_iter().take(MAX_HITS).map(|(_, id)| id).collect())
    }
}

/// Deadline-bounded access to a [`SearchIndex`]. Index writes are derived state and only log
/// on failure; queries surface `UpstreamUnavailable`.
#[derive(Clone)]
pub struct Search {
    index: Arc<dyn SearchIndex>,
    timeout: Duration,
}

impl Search {
    pub fn new(index: Arc<dyn SearchIndex>, timeout: Duration) -> Self {
        Self { index, timeout }
    }

    pub async fn index_film(&self, doc: &FilmDoc) {
        match tokio::time::timeout(self.timeout, self.index.index_film(doc)).await {
            Ok(Ok(())) => {},
            Ok(Err(err)) => warn!(film_id = doc.id, error = %err, "search indexing failed"),
            Err(_) => warn!(film_id = doc.id, "search indexing timed out"),
        }
    }

    pub async fn delete_film(&self, id: i32) {
        match tokio::time::timeout(self.timeout, self.index.delete_film(id)).await {
            Ok(Ok(())) => {},
            Ok(Err(err)) => warn!(film_id = id, error = %err, "search delete failed"),
            Err(_) => warn!(film_id = id, "search delete timed out"),
        }
    }

    pub async fn search(&self, query: &str) -> AppResult<Vec<i32>> {
        match tokio::time::timeout(self.timeout, self.index.search(query)).await {
            Ok(Ok(ids)) => Ok(ids),
            Ok(Err(err)) => {
                warn!(error = %err, "search query failed");
                Err(AppError::UpstreamUnavailable("search"))
            },
            Err(_) => {
                warn!("search query timed out");
                Err(AppError::UpstreamUnavailable("search"))
            },
        }
    }
}
