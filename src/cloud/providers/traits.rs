use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::collections::BTreeMap;
use std::pin::Pin;

use super::ProviderType;
use crate::cloud::models::*;
use crate::libs::error::{AnyResult, CloudFsError};

/// Content flowing to or from a store, chunk by chunk
pub type ByteStream = Pin<Box<dyn Stream<Item = AnyResult<Bytes>> + Send>>;

/// A hierarchical remote storage service.
///
/// Implementations only translate calls to their backend. Throttling, caching
/// and naming the failed operation happen in `Remote`, and retries belong to
/// the backend client if anywhere.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    /// One page of the entries matching `query`, in the store's listing order
    async fn list_children(&self, query: &Query, page_token: Option<&str>) -> AnyResult<Page>;
    async fn get_entry(&self, id: &str) -> AnyResult<Entry>;
    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> AnyResult<Entry>;
    async fn create_file(&self, metadata: NewFile, content: ByteStream) -> AnyResult<Entry>;
    /// Replace the content of `id`, overwriting the given properties
    async fn update_file(
        &self,
        id: &str,
        properties: BTreeMap<String, String>,
        content: ByteStream,
    ) -> AnyResult<Entry>;
    async fn download(&self, id: &str) -> AnyResult<ByteStream>;

    /// Reparent `id` under `add_parent`, detach it from `remove_parents` and rename it
    async fn move_entry(
        &self,
        id: &str,
        add_parent: &str,
        remove_parents: &[String],
        new_name: &str,
    ) -> AnyResult<Entry>;

    async fn set_permissions(
        &self,
        _id: &str,
        _permissions: &[Permission],
    ) -> AnyResult<PermissionGrant> {
        Err(CloudFsError::Unsupported(format!(
            "{} does not manage permissions",
            self.provider_type().as_str()
        )))
    }
}
