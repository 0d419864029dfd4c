use futures::StreamExt;
use log::{debug, info, warn};
use mime_guess::from_path;
use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use super::models::*;
use super::pager::ListingPager;
use super::providers::RemoteStore;
use super::remote::Remote;
use super::resolver::{FolderCreator, PathResolver};
use super::transfer::{read_local, FirstError, TransferPipeline};
use crate::libs::config::CloudFsConfig;
use crate::libs::constants::{
    DEFAULT_MIME_TYPE, ORIGINAL_NAME_PROPERTY, ROOT_ID, TRANSFORMS_PROPERTY,
};
use crate::libs::error::{AnyResult, CloudFsError};

/**
 * Check that a remote name can be joined onto a local directory without
 * leaving it
 */
pub(crate) fn local_file_name(name: &str) -> AnyResult<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(name),
        _ => Err(CloudFsError::Path(format!(
            "'{}' is not a plain file name",
            name
        ))),
    }
}

/**
 * Entry point of the library: a remote store plus the throttle and query
 * cache shared by every operation issued through this value.
 *
 * Wrap it in an `Arc` to share it between tasks.
 */
pub struct CloudFs {
    remote: Remote,
    config: CloudFsConfig,
}

impl CloudFs {
    pub fn new(store: Arc<dyn RemoteStore>, config: CloudFsConfig) -> Self {
        info!(
            "Using {} store (throttle {:?}, cache ttl {:?})",
            store.provider_type().as_str(),
            config.throttle_interval(),
            config.cache_ttl()
        );
        Self {
            remote: Remote::new(store, &config),
            config,
        }
    }

    pub fn config(&self) -> &CloudFsConfig {
        &self.config
    }

    pub fn remote(&self) -> &Remote {
        &self.remote
    }

    pub fn resolver(&self) -> PathResolver<'_> {
        PathResolver::new(&self.remote)
    }

    pub fn folders(&self) -> FolderCreator<'_> {
        FolderCreator::new(&self.remote)
    }

    pub fn pager(&self) -> ListingPager<'_> {
        ListingPager::new(&self.remote)
    }

    pub async fn resolve_path(&self, path: &str) -> AnyResult<Option<Entry>> {
        self.resolver().resolve(&VirtualPath::parse(path)?).await
    }

    pub async fn ensure_path(&self, path: &str) -> AnyResult<Entry> {
        self.folders().ensure_path(&VirtualPath::parse(path)?).await
    }

    /// Every file directly inside the folder at `path`, or `None` if there is no such folder
    pub async fn list_files(&self, path: &str) -> AnyResult<Option<Vec<Entry>>> {
        let Some(folder) = self.resolve_path(path).await? else {
            return Ok(None);
        };
        if !folder.is_folder() {
            debug!("{} is not a folder", path);
            return Ok(None);
        }
        Ok(Some(self.pager().collect(&folder.id, true).await?))
    }

    pub async fn get_entry(&self, id: &str) -> AnyResult<Entry> {
        self.remote.get_entry(id).await
    }

    pub async fn set_permissions(
        &self,
        id: &str,
        permissions: &[Permission],
    ) -> AnyResult<PermissionGrant> {
        self.remote.set_permissions(id, permissions).await
    }

    /// Parent ids for an upload named `path`
    async fn upload_parents(
        &self,
        path: &VirtualPath,
        options: &UploadOptions,
    ) -> AnyResult<Vec<String>> {
        if path.len() > 1 {
            let folder = self.folders().ensure_path(&path.parent()).await?;
            if !options.permissions.is_empty() {
                let grant = self
                    .remote
                    .set_permissions(&folder.id, &options.permissions)
                    .await?;
                debug!("Granted {:?} on {}", grant.permission_ids, folder.id);
            }
            return Ok(vec![folder.id]);
        }
        if options.parents.is_empty() {
            Ok(vec![ROOT_ID.to_string()])
        } else {
            Ok(options.parents.clone())
        }
    }

    /**
     * Upload the local file `source` as `name`. Folders in `name` are created
     * as needed; an existing file with the same stored name is overwritten.
     */
    pub async fn upload(
        &self,
        name: &str,
        source: &Path,
        options: &UploadOptions,
    ) -> AnyResult<Entry> {
        let path = VirtualPath::parse(name)?;
        let file_name = path
            .file_name()
            .ok_or_else(|| CloudFsError::Path(format!("'{}' has no file name", name)))?;

        let pipeline = TransferPipeline::for_upload(options);
        let remote_name = pipeline.remote_name(file_name);
        let parents = self.upload_parents(&path, options).await?;
        let parent_id = parents.first().map(String::as_str).unwrap_or(ROOT_ID);

        let existing = PathResolver::live(&self.remote)
            .find_child(&remote_name, parent_id)
            .await?;
        if let Some(folder) = existing.as_ref().filter(|entry| entry.is_folder()) {
            return Err(CloudFsError::Conflict(format!(
                "folder '{}' ({}) occupies the upload name",
                remote_name, folder.id
            )));
        }

        let first_error = FirstError::new();
        let content = read_local(source).await?;
        let content = first_error.watch(pipeline.encode(content, self.config.password.as_deref())?);

        let original_name = source
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.to_string());
        // Written on updates too, downloads decode by the recorded transforms
        let properties = BTreeMap::from([
            (TRANSFORMS_PROPERTY.to_string(), pipeline.property_value()),
            (ORIGINAL_NAME_PROPERTY.to_string(), original_name),
        ]);

        let result = match existing {
            Some(file) => {
                info!("Updating {} ({})", remote_name, file.id);
                self.remote.update_file(&file.id, properties, content).await
            }
            None => {
                let mime_type = match (&options.mime_type, options.convert) {
                    (Some(mime_type), true) => mime_type.clone(),
                    _ => from_path(&remote_name)
                        .first()
                        .map(|mime| mime.to_string())
                        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
                };
                let metadata = NewFile {
                    name: remote_name.clone(),
                    parents: parents.clone(),
                    mime_type,
                    properties,
                    convert: options.convert,
                };
                info!("Creating {} under {}", remote_name, parent_id);
                self.remote.create_file(metadata, content).await
            }
        };
        let entry = result.map_err(|e| match first_error.reason() {
            Some(_) => first_error.transfer_error(source, e),
            None => e,
        })?;

        self.remote.remember(
            &Query::named(&remote_name, Some(parent_id)),
            Page::new(vec![entry.clone()], None),
        );
        if !options.keep_local_after_upload {
            tokio::fs::remove_file(source)
                .await
                .map_err(|e| CloudFsError::local_io(source, e))?;
            debug!("Removed local {}", source.display());
        }
        Ok(entry)
    }

    /**
     * Download the file `id` to `dest`, reversing its transforms. When `dest`
     * is a directory the logical name of the file is appended to it.
     */
    pub async fn download(&self, id: &str, dest: &Path) -> AnyResult<Downloaded> {
        let entry = self.remote.get_entry(id).await?;
        let pipeline = TransferPipeline::for_download(&entry)?;
        let logical_name = pipeline.logical_name(&entry.name);

        let is_dir = tokio::fs::metadata(dest)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false);
        let local_path = if is_dir {
            dest.join(local_file_name(&logical_name)?)
        } else {
            dest.to_path_buf()
        };
        self.download_entry(entry, pipeline, logical_name, &local_path)
            .await
    }

    /**
     * Stream an entry into `local_path`. A failed transfer leaves the partial
     * file in place and reports its path.
     */
    pub(crate) async fn download_entry(
        &self,
        entry: Entry,
        pipeline: TransferPipeline,
        logical_name: String,
        local_path: &Path,
    ) -> AnyResult<Downloaded> {
        if !entry.is_file() {
            return Err(CloudFsError::Unsupported(format!(
                "'{}' is a folder and cannot be downloaded",
                entry.name
            )));
        }

        let first_error = FirstError::new();
        let fetched = self
            .remote
            .download(&entry.id)
            .await
            .map_err(|e| first_error.transfer_error(local_path, e))?;
        let mut content = pipeline
            .decode(fetched, self.config.password.as_deref())
            .map_err(|e| first_error.transfer_error(local_path, e))?;

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| CloudFsError::local_io(local_path, e))?;
        while let Some(chunk) = content.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("Download of {} failed, partial file left at {}", entry.id, local_path.display());
                    first_error.record(&e);
                    return Err(first_error.transfer_error(local_path, e));
                }
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| CloudFsError::local_io(local_path, e))?;
        }
        file.flush()
            .await
            .map_err(|e| CloudFsError::local_io(local_path, e))?;

        info!("Downloaded {} to {}", entry.name, local_path.display());
        Ok(Downloaded {
            entry,
            logical_name,
            local_path: local_path.to_path_buf(),
        })
    }

    /**
     * Move the entry at `src` to `dst`, renaming it to the last component of
     * `dst`. Nothing is changed when the destination is already taken.
     */
    pub async fn move_entry(&self, src: &str, dst: &str) -> AnyResult<Entry> {
        let src_path = VirtualPath::parse(src)?;
        let dst_path = VirtualPath::parse(dst)?;
        let (Some(_), Some(new_name)) = (src_path.file_name(), dst_path.file_name()) else {
            return Err(CloudFsError::Path("the root folder cannot be moved".to_string()));
        };

        let resolver = PathResolver::live(&self.remote);
        let source = resolver
            .resolve(&src_path)
            .await?
            .ok_or_else(|| CloudFsError::NotFound(src.to_string()))?;
        let target = resolver
            .resolve(&dst_path.parent())
            .await?
            .filter(Entry::is_folder)
            .ok_or_else(|| CloudFsError::NotFound(format!("folder {}", dst_path.parent())))?;

        if let Some(occupant) = resolver.find_child(new_name, &target.id).await? {
            if occupant.id == source.id {
                return Ok(source);
            }
            return Err(CloudFsError::Conflict(dst.to_string()));
        }

        let remove_parents: Vec<String> = source.parents.iter().cloned().collect();
        let moved = self
            .remote
            .move_entry(&source.id, &target.id, &remove_parents, new_name)
            .await?;
        self.remote.cache().invalidate_entry(&source.id);
        info!("Moved {} to {}", src, dst);
        Ok(moved)
    }
}
