use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dropbox_sdk::{default_client::UserAuthDefaultClient, files, oauth2::Authorization};
use futures::StreamExt;
use log::info;
use mime_guess::from_path;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{ByteStream, ProviderType, RemoteStore};
use crate::cloud::models::*;
use crate::libs::config::CloudFsConfig;
use crate::libs::constants::ROOT_ID;
use crate::libs::error::{AnyResult, CloudFsError};

/**
 * Dropbox backend.
 *
 * Dropbox has no custom properties without templates, so entries read back
 * from it carry no transform list and downloads fall back to the name
 * suffixes. Listings are filtered client side and `get_entry` cannot tell the
 * parent id of an entry.
 *
 * The SDK client is blocking: every call runs on tokio's blocking pool with
 * its own handle to the client, the lock only guards the session slot.
 */
pub struct Dropbox {
    client: Mutex<Option<Arc<UserAuthDefaultClient>>>,
    page_size: u32,
}

impl Dropbox {
    pub fn new(client: UserAuthDefaultClient) -> Self {
        Self {
            client: Mutex::new(Some(Arc::new(client))),
            page_size: CloudFsConfig::default().page_size as u32,
        }
    }

    pub fn from_config(client: UserAuthDefaultClient, config: &CloudFsConfig) -> Self {
        Self {
            page_size: config.page_size as u32,
            ..Self::new(client)
        }
    }

    /// Restore a session from data saved by `Authorization::save`
    pub fn new_with_auth_data(client_id: &str, auth_data: &str) -> Option<Self> {
        let auth = Authorization::load(client_id.to_string(), auth_data)?;
        Some(Self::new(UserAuthDefaultClient::new(auth)))
    }

    pub async fn is_authorized(&self) -> bool {
        self.client.lock().await.is_some()
    }

    pub async fn unauthorize(&self) {
        *self.client.lock().await = None;
    }

    /// Run a blocking SDK call against the current session
    async fn call<T, F>(&self, f: F) -> AnyResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&UserAuthDefaultClient) -> AnyResult<T> + Send + 'static,
    {
        let client = self
            .client
            .lock()
            .await
            .clone()
            .ok_or(CloudFsError::Dropbox("Not authorized".to_string()))?;
        tokio::task::spawn_blocking(move || f(&client))
            .await
            .map_err(|e| CloudFsError::Dropbox(format!("SDK call did not complete: {}", e)))?
    }

    fn amend_path_or_id(folder_id: &str) -> String {
        if folder_id.is_empty() || folder_id == "/" || folder_id == ROOT_ID {
            String::new()
        } else {
            folder_id.to_string()
        }
    }

    /// Display path of a folder, empty for the root
    fn folder_path(client: &UserAuthDefaultClient, folder_id: &str) -> AnyResult<String> {
        let path_or_id = Self::amend_path_or_id(folder_id);
        if path_or_id.is_empty() {
            return Ok(path_or_id);
        }
        match files::get_metadata(client, &files::GetMetadataArg::new(path_or_id))? {
            files::Metadata::Folder(folder) => folder
                .path_display
                .ok_or_else(|| CloudFsError::Dropbox(format!("'{}' has no path", folder_id))),
            _ => Err(CloudFsError::Dropbox(format!("'{}' is not a folder", folder_id))),
        }
    }

    fn child_path(client: &UserAuthDefaultClient, parent_id: Option<&str>, name: &str) -> AnyResult<String> {
        let parent_path = match parent_id {
            Some(id) => Self::folder_path(client, id)?,
            None => String::new(),
        };
        Ok(format!("{}/{}", parent_path, name))
    }
}

fn parent_set(parent_id: Option<&str>) -> BTreeSet<String> {
    parent_id.map(str::to_string).into_iter().collect()
}

fn file_entry(f: files::FileMetadata, parent_id: Option<&str>) -> Entry {
    Entry {
        mime_type: Some(from_path(&f.name).first_or_octet_stream().to_string()),
        modified_at: DateTime::parse_from_rfc3339(&f.server_modified)
            .ok()
            .map(|date| date.with_timezone(&Utc)),
        id: f.id,
        name: f.name,
        parents: parent_set(parent_id),
        size: f.size as u64,
        kind: EntryKind::File,
        properties: Default::default(),
        from_cache: false,
    }
}

fn to_entry(metadata: files::Metadata, parent_id: Option<&str>) -> Option<Entry> {
    match metadata {
        files::Metadata::File(f) => Some(file_entry(f, parent_id)),
        files::Metadata::Folder(f) => Some(Entry {
            parents: parent_set(parent_id),
            ..Entry::folder(f.id, f.name, ROOT_ID)
        }),
        _ => None,
    }
}

async fn read_all(mut content: ByteStream) -> AnyResult<Vec<u8>> {
    let mut body = Vec::new();
    while let Some(chunk) = content.next().await {
        body.extend_from_slice(&chunk?);
    }
    Ok(body)
}

#[async_trait]
impl RemoteStore for Dropbox {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Dropbox
    }

    async fn list_children(&self, query: &Query, page_token: Option<&str>) -> AnyResult<Page> {
        let query = query.clone();
        let cursor = page_token.map(str::to_string);
        let page_size = self.page_size;

        self.call(move |client| {
            let result = match cursor {
                Some(cursor) => files::list_folder_continue(
                    client,
                    &files::ListFolderContinueArg::new(cursor),
                )?,
                None => {
                    let list_folder_arg =
                        files::ListFolderArg::new(Self::amend_path_or_id(&query.parent))
                            .with_include_deleted(false)
                            .with_limit(page_size);
                    files::list_folder(client, &list_folder_arg)?
                }
            };

            let entries: Vec<Entry> = result
                .entries
                .into_iter()
                .filter_map(|metadata| to_entry(metadata, Some(&query.parent)))
                .filter(|entry| query.matches(entry))
                .collect();
            info!("Found {} matching entries in Dropbox", entries.len());

            let next_page_token = if result.has_more {
                Some(result.cursor)
            } else {
                None
            };
            Ok(Page::new(entries, next_page_token))
        })
        .await
    }

    async fn get_entry(&self, id: &str) -> AnyResult<Entry> {
        if id == ROOT_ID {
            return Ok(Entry::root());
        }
        let id = id.to_string();
        self.call(move |client| {
            let metadata = files::get_metadata(client, &files::GetMetadataArg::new(id.clone()))?;
            to_entry(metadata, None)
                .ok_or_else(|| CloudFsError::Dropbox(format!("'{}' was deleted", id)))
        })
        .await
    }

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> AnyResult<Entry> {
        let name = name.to_string();
        let parent_id = parent_id.map(str::to_string);

        self.call(move |client| {
            let folder_path = Self::child_path(client, parent_id.as_deref(), &name)?;
            let create_folder_arg = files::CreateFolderArg::new(folder_path);
            let result = files::create_folder_v2(client, &create_folder_arg)?;

            Ok(Entry::folder(
                result.metadata.id,
                result.metadata.name,
                parent_id.as_deref().unwrap_or(ROOT_ID),
            ))
        })
        .await
    }

    async fn create_file(&self, metadata: NewFile, content: ByteStream) -> AnyResult<Entry> {
        let body = read_all(content).await?;

        self.call(move |client| {
            let parent_id = metadata.parents.first().map(String::as_str);
            let file_path = Self::child_path(client, parent_id, &metadata.name)?;
            let upload_arg = files::UploadArg::new(file_path).with_mode(files::WriteMode::Add);
            let result = files::upload(client, &upload_arg, body.as_slice())?;

            let mut entry = file_entry(result, Some(parent_id.unwrap_or(ROOT_ID)));
            // Echo the requested properties so the caller sees what it asked for
            entry.properties = metadata.properties;
            Ok(entry)
        })
        .await
    }

    async fn update_file(
        &self,
        id: &str,
        properties: BTreeMap<String, String>,
        content: ByteStream,
    ) -> AnyResult<Entry> {
        let body = read_all(content).await?;
        let id = id.to_string();

        self.call(move |client| {
            let upload_arg = files::UploadArg::new(id).with_mode(files::WriteMode::Overwrite);
            let result = files::upload(client, &upload_arg, body.as_slice())?;
            let mut entry = file_entry(result, None);
            entry.properties = properties;
            Ok(entry)
        })
        .await
    }

    async fn download(&self, id: &str) -> AnyResult<ByteStream> {
        let id = id.to_string();
        let buffer = self
            .call(move |client| {
                let download_arg = files::DownloadArg::new(id);
                let result = files::download(client, &download_arg, None, None)?;

                let mut buffer = Vec::new();
                result
                    .body
                    .ok_or(CloudFsError::Dropbox(
                        "Failed to read file content".to_string(),
                    ))?
                    .read_to_end(&mut buffer)?;
                Ok(buffer)
            })
            .await?;

        let chunks: Vec<AnyResult<Bytes>> = vec![Ok(Bytes::from(buffer))];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn move_entry(
        &self,
        id: &str,
        add_parent: &str,
        _remove_parents: &[String],
        new_name: &str,
    ) -> AnyResult<Entry> {
        let id = id.to_string();
        let add_parent = add_parent.to_string();
        let new_name = new_name.to_string();

        self.call(move |client| {
            // A Dropbox entry has exactly one parent, moving it detaches the old one
            let to_path = Self::child_path(client, Some(&add_parent), &new_name)?;
            let relocation_arg = files::RelocationArg::new(id.clone(), to_path);
            let result = files::move_v2(client, &relocation_arg)?;

            to_entry(result.metadata, Some(&add_parent))
                .ok_or_else(|| CloudFsError::Dropbox(format!("'{}' vanished while moving", id)))
        })
        .await
    }
}
