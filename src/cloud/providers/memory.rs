use anyhow::anyhow;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::StreamExt;
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{ByteStream, ProviderType, RemoteStore};
use crate::cloud::models::*;
use crate::libs::config::CloudFsConfig;
use crate::libs::constants::ROOT_ID;
use crate::libs::error::{AnyResult, CloudFsError};

const DEFAULT_PAGE_SIZE: usize = 100;
// Downloads are served in chunks of this size
const DOWNLOAD_CHUNK_SIZE: usize = 16 * 1024;

#[derive(Default)]
struct MemoryState {
    // Insertion order is the listing order
    entries: Vec<Entry>,
    contents: HashMap<String, Bytes>,
    permissions: HashMap<String, Vec<Permission>>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, String>,
}

impl MemoryState {
    fn position(&self, id: &str) -> AnyResult<usize> {
        self.entries
            .iter()
            .position(|entry| entry.id == id)
            .ok_or_else(|| CloudFsError::Store(format!("no entry with id '{}'", id)))
    }

    fn check_folder(&self, id: &str) -> AnyResult<()> {
        if id == ROOT_ID {
            return Ok(());
        }
        let entry = &self.entries[self.position(id)?];
        if entry.is_folder() {
            Ok(())
        } else {
            Err(CloudFsError::Store(format!("'{}' is not a folder", id)))
        }
    }
}

/**
 * A store kept in process memory. It behaves like a remote service with
 * server-side query filtering and fixed-size pages, and counts every call so
 * callers can check how many round trips an operation costs.
 */
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn from_config(config: &CloudFsConfig) -> Self {
        Self::with_page_size(config.page_size)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            page_size: page_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a call and fail it if a failure was scheduled
    fn begin(&self, operation: &'static str) -> AnyResult<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_default() += 1;
        if let Some(message) = state.failures.remove(operation) {
            debug!("Failing scheduled '{}' call: {}", operation, message);
            return Err(anyhow!("{}", message).into());
        }
        Ok(state)
    }

    /// Number of calls of `operation` (`list`, `get`, `create_folder`, ...)
    pub fn calls(&self, operation: &str) -> usize {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make the next call of `operation` fail with `message`
    pub fn fail_next(&self, operation: &'static str, message: &str) {
        self.lock().failures.insert(operation, message.to_string());
    }

    /// Add a file without going through the counted API
    pub fn insert_file(&self, name: &str, parent_id: &str, content: &[u8]) -> Entry {
        let mut entry = Entry::file(new_id(), name, parent_id, content.len() as u64);
        entry.modified_at = Some(Utc::now());
        let mut state = self.lock();
        state
            .contents
            .insert(entry.id.clone(), Bytes::copy_from_slice(content));
        state.entries.push(entry.clone());
        entry
    }

    /// Add a folder without going through the counted API
    pub fn insert_folder(&self, name: &str, parent_id: &str) -> Entry {
        let entry = Entry::folder(new_id(), name, parent_id);
        self.lock().entries.push(entry.clone());
        entry
    }

    pub fn content(&self, id: &str) -> Option<Bytes> {
        self.lock().contents.get(id).cloned()
    }

    pub fn replace_content(&self, id: &str, content: &[u8]) {
        self.lock()
            .contents
            .insert(id.to_string(), Bytes::copy_from_slice(content));
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.lock().entries.clone()
    }

    pub fn folders_named(&self, name: &str) -> Vec<Entry> {
        self.lock()
            .entries
            .iter()
            .filter(|entry| entry.is_folder() && entry.name == name)
            .cloned()
            .collect()
    }

    pub fn permissions(&self, id: &str) -> Vec<Permission> {
        self.lock().permissions.get(id).cloned().unwrap_or_default()
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

async fn collect(mut content: ByteStream) -> AnyResult<Bytes> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = content.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer.freeze())
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Memory
    }

    async fn list_children(&self, query: &Query, page_token: Option<&str>) -> AnyResult<Page> {
        let state = self.begin("list")?;
        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| CloudFsError::Store(format!("invalid page token '{}'", token)))?,
            None => 0,
        };

        let matching: Vec<&Entry> = state
            .entries
            .iter()
            .filter(|entry| query.matches(entry))
            .collect();
        let end = (offset + self.page_size).min(matching.len());
        let entries = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|entry| (*entry).clone())
            .collect();
        let next_page_token = (end < matching.len()).then(|| end.to_string());

        Ok(Page::new(entries, next_page_token))
    }

    async fn get_entry(&self, id: &str) -> AnyResult<Entry> {
        let state = self.begin("get")?;
        if id == ROOT_ID {
            return Ok(Entry::root());
        }
        let position = state.position(id)?;
        Ok(state.entries[position].clone())
    }

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> AnyResult<Entry> {
        let mut state = self.begin("create_folder")?;
        let parent = parent_id.unwrap_or(ROOT_ID);
        state.check_folder(parent)?;

        let mut entry = Entry::folder(new_id(), name, parent);
        entry.modified_at = Some(Utc::now());
        state.entries.push(entry.clone());
        Ok(entry)
    }

    async fn create_file(&self, metadata: NewFile, content: ByteStream) -> AnyResult<Entry> {
        {
            let state = self.begin("create_file")?;
            for parent in &metadata.parents {
                state.check_folder(parent)?;
            }
        }
        let content = collect(content).await?;

        let entry = Entry {
            id: new_id(),
            name: metadata.name,
            parents: metadata.parents.into_iter().collect::<BTreeSet<_>>(),
            size: content.len() as u64,
            kind: EntryKind::File,
            mime_type: Some(metadata.mime_type),
            modified_at: Some(Utc::now()),
            properties: metadata.properties,
            from_cache: false,
        };
        let mut state = self.lock();
        state.contents.insert(entry.id.clone(), content);
        state.entries.push(entry.clone());
        Ok(entry)
    }

    async fn update_file(
        &self,
        id: &str,
        properties: BTreeMap<String, String>,
        content: ByteStream,
    ) -> AnyResult<Entry> {
        {
            let state = self.begin("update_file")?;
            state.position(id)?;
        }
        let content = collect(content).await?;

        let mut state = self.lock();
        let position = state.position(id)?;
        let entry = &mut state.entries[position];
        entry.size = content.len() as u64;
        entry.modified_at = Some(Utc::now());
        entry.properties.extend(properties);
        let updated = entry.clone();
        state.contents.insert(id.to_string(), content);
        Ok(updated)
    }

    async fn download(&self, id: &str) -> AnyResult<ByteStream> {
        let state = self.begin("download")?;
        let content = state
            .contents
            .get(id)
            .cloned()
            .ok_or_else(|| CloudFsError::Store(format!("no content for '{}'", id)))?;

        let chunks: Vec<AnyResult<Bytes>> = content
            .chunks(DOWNLOAD_CHUNK_SIZE)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn move_entry(
        &self,
        id: &str,
        add_parent: &str,
        remove_parents: &[String],
        new_name: &str,
    ) -> AnyResult<Entry> {
        let mut state = self.begin("move")?;
        state.check_folder(add_parent)?;
        let position = state.position(id)?;

        let entry = &mut state.entries[position];
        for parent in remove_parents {
            entry.parents.remove(parent);
        }
        entry.parents.insert(add_parent.to_string());
        entry.name = new_name.to_string();
        entry.modified_at = Some(Utc::now());
        Ok(entry.clone())
    }

    async fn set_permissions(
        &self,
        id: &str,
        permissions: &[Permission],
    ) -> AnyResult<PermissionGrant> {
        let mut state = self.begin("set_permissions")?;
        if id != ROOT_ID {
            state.position(id)?;
        }

        let granted = state.permissions.entry(id.to_string()).or_default();
        let mut permission_ids = Vec::with_capacity(permissions.len());
        for permission in permissions {
            granted.push(permission.clone());
            permission_ids.push(format!("{}-{}", id, granted.len()));
        }
        Ok(PermissionGrant {
            id: id.to_string(),
            permission_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn bytes_stream(data: &'static [u8]) -> ByteStream {
        Box::pin(futures::stream::iter(vec![Ok(Bytes::from_static(data))]))
    }

    #[tokio::test]
    async fn pages_follow_tokens() {
        let store = MemoryStore::with_page_size(2);
        for i in 0..5 {
            store.insert_file(&format!("f{}", i), ROOT_ID, b"x");
        }
        let query = Query::children(ROOT_ID, true);

        let first = store.list_children(&query, None).await.unwrap();
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.next_page_token.as_deref(), Some("2"));

        let last = store.list_children(&query, Some("4")).await.unwrap();
        assert_eq!(last.entries.len(), 1);
        assert_eq!(last.next_page_token, None);
        assert_eq!(store.calls("list"), 2);
    }

    #[tokio::test]
    async fn create_and_download_file() {
        let store = MemoryStore::new();
        let metadata = NewFile {
            name: "a.txt".to_string(),
            parents: vec![ROOT_ID.to_string()],
            mime_type: "text/plain".to_string(),
            properties: Default::default(),
            convert: false,
        };
        let entry = store
            .create_file(metadata, bytes_stream(b"hello"))
            .await
            .unwrap();
        assert_eq!(entry.size, 5);

        let chunks: Vec<Bytes> = store
            .download(&entry.id)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), b"hello");
    }

    #[tokio::test]
    async fn scheduled_failure_hits_once() {
        let store = MemoryStore::new();
        store.fail_next("create_folder", "quota exceeded");

        let err = store.create_folder("a", None).await.unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
        assert!(store.create_folder("a", None).await.is_ok());
        assert_eq!(store.calls("create_folder"), 2);
    }

    #[tokio::test]
    async fn refuses_file_as_parent() {
        let store = MemoryStore::new();
        let file = store.insert_file("a.txt", ROOT_ID, b"x");
        assert!(matches!(
            store.create_folder("b", Some(&file.id)).await,
            Err(CloudFsError::Store(_))
        ));
    }
}
