use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::cache::QueryCache;
use super::models::*;
use super::providers::{ByteStream, RemoteStore};
use super::throttle::Throttle;
use crate::libs::config::CloudFsConfig;
use crate::libs::error::AnyResult;

/**
 * Every call to the store goes through here: it waits for the throttle,
 * names the operation on failure and, for lookups, consults the query cache.
 */
pub struct Remote {
    store: Arc<dyn RemoteStore>,
    throttle: Throttle,
    cache: QueryCache,
}

fn cache_key(query: &Query, page_token: Option<&str>) -> String {
    match page_token {
        Some(token) => format!("{} pageToken={}", query, token),
        None => query.to_string(),
    }
}

impl Remote {
    pub fn new(store: Arc<dyn RemoteStore>, config: &CloudFsConfig) -> Self {
        Self {
            store,
            throttle: Throttle::new(config.throttle_interval()),
            cache: QueryCache::new(config.cache_ttl(), config.cache_check_period()),
        }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /**
     * Listing call answered from the cache when possible. Only pages with at
     * least one entry are remembered, so a later creation is never hidden.
     */
    pub async fn lookup(&self, query: &Query, page_token: Option<&str>) -> AnyResult<Page> {
        let key = cache_key(query, page_token);
        if let Some(page) = self.cache.get(&key) {
            return Ok(page);
        }

        let page = self.list(query, page_token).await?;
        if !page.entries.is_empty() {
            self.cache.set(&key, page.clone());
        }
        Ok(page)
    }

    /// Store `page` as the answer to the first page of `query`
    pub fn remember(&self, query: &Query, page: Page) {
        self.cache.set(&cache_key(query, None), page);
    }

    /// Live listing call, never cached
    pub async fn list(&self, query: &Query, page_token: Option<&str>) -> AnyResult<Page> {
        self.throttle.acquire().await;
        debug!("list: {}", query);
        self.store
            .list_children(query, page_token)
            .await
            .map_err(|e| e.during("list"))
    }

    pub async fn get_entry(&self, id: &str) -> AnyResult<Entry> {
        self.throttle.acquire().await;
        self.store.get_entry(id).await.map_err(|e| e.during("get"))
    }

    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> AnyResult<Entry> {
        self.throttle.acquire().await;
        debug!("create_folder: {} under {:?}", name, parent_id);
        self.store
            .create_folder(name, parent_id)
            .await
            .map_err(|e| e.during("create_folder"))
    }

    pub async fn create_file(&self, metadata: NewFile, content: ByteStream) -> AnyResult<Entry> {
        self.throttle.acquire().await;
        self.store
            .create_file(metadata, content)
            .await
            .map_err(|e| e.during("create_file"))
    }

    pub async fn update_file(
        &self,
        id: &str,
        properties: BTreeMap<String, String>,
        content: ByteStream,
    ) -> AnyResult<Entry> {
        self.throttle.acquire().await;
        self.store
            .update_file(id, properties, content)
            .await
            .map_err(|e| e.during("update_file"))
    }

    pub async fn download(&self, id: &str) -> AnyResult<ByteStream> {
        self.throttle.acquire().await;
        self.store
            .download(id)
            .await
            .map_err(|e| e.during("download"))
    }

    pub async fn move_entry(
        &self,
        id: &str,
        add_parent: &str,
        remove_parents: &[String],
        new_name: &str,
    ) -> AnyResult<Entry> {
        self.throttle.acquire().await;
        self.store
            .move_entry(id, add_parent, remove_parents, new_name)
            .await
            .map_err(|e| e.during("move"))
    }

    pub async fn set_permissions(
        &self,
        id: &str,
        permissions: &[Permission],
    ) -> AnyResult<PermissionGrant> {
        self.throttle.acquire().await;
        self.store
            .set_permissions(id, permissions)
            .await
            .map_err(|e| e.during("set_permissions"))
    }
}
