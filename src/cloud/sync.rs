use log::{info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::client::{local_file_name, CloudFs};
use super::models::*;
use super::transfer::TransferPipeline;
use crate::libs::error::{AnyResult, CloudFsError};
use crate::libs::utils::{scan_files, TimeLogger};

/**
 * The marker file of a local folder, listing the ids of remote files already
 * downloaded there. Ids are separated by commas or newlines; new ids are
 * appended one per line.
 */
pub struct ExistingMarker {
    path: PathBuf,
    ids: HashSet<String>,
    // The file does not end with a separator yet
    needs_separator: bool,
}

impl ExistingMarker {
    /// Read the marker at `path`, a missing file being an empty marker
    pub async fn load(path: &Path) -> AnyResult<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(CloudFsError::local_io(path, e)),
        };
        let ids = content
            .split([',', '\n'])
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            ids,
            needs_separator: !content.is_empty() && !content.ends_with(['\n', ',']),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub async fn record(&mut self, id: &str) -> AnyResult<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| CloudFsError::local_io(&self.path, e))?;

        let mut line = String::new();
        if self.needs_separator {
            line.push('\n');
        }
        line.push_str(id);
        line.push('\n');
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| CloudFsError::local_io(&self.path, e))?;

        self.needs_separator = false;
        self.ids.insert(id.to_string());
        Ok(())
    }
}

impl CloudFs {
    async fn remote_folder(&self, remote_dir: &str) -> AnyResult<Option<Entry>> {
        Ok(self
            .resolve_path(remote_dir)
            .await?
            .filter(Entry::is_folder))
    }

    /**
     * Download every file of `remote_dir` not yet listed in the marker of
     * `local_dir`, as `<id>-<logical name>`. Returns `None` when the remote
     * folder does not exist. A failed file is logged and retried next run.
     */
    pub async fn download_new_files(
        &self,
        remote_dir: &str,
        local_dir: &Path,
    ) -> AnyResult<Option<Vec<Downloaded>>> {
        let Some(folder) = self.remote_folder(remote_dir).await? else {
            return Ok(None);
        };
        let time_logger = TimeLogger::new(format!("Downloaded new files of {}", remote_dir));

        tokio::fs::create_dir_all(local_dir)
            .await
            .map_err(|e| CloudFsError::local_io(local_dir, e))?;
        let mut marker = ExistingMarker::load(&local_dir.join(&self.config().marker_file)).await?;

        let pending: Vec<Entry> = self
            .pager()
            .collect(&folder.id, true)
            .await?
            .into_iter()
            .filter(|entry| !marker.contains(&entry.id))
            .collect();
        let mut downloaded = Vec::new();
        for entry in pending {
            let id = entry.id.clone();
            let pipeline = TransferPipeline::for_download(&entry)?;
            let logical_name = pipeline.logical_name(&entry.name);
            let local_name = format!("{}-{}", id, logical_name);
            let local_path = match local_file_name(&local_name) {
                Ok(name) => local_dir.join(name),
                Err(e) => {
                    warn!("Skipping {}: {}", id, e);
                    continue;
                }
            };

            match self
                .download_entry(entry, pipeline, logical_name, &local_path)
                .await
            {
                Ok(file) => {
                    marker.record(&id).await?;
                    downloaded.push(file);
                }
                Err(e) => warn!("Skipping {}: {}", id, e),
            }
        }

        info!("{} new files in {}", downloaded.len(), remote_dir);
        time_logger.complete();
        Ok(Some(downloaded))
    }

    /**
     * Upload every visible file directly inside `local_dir` to `remote_dir`,
     * then move each uploaded file into `move_to`. Returns `None` when the
     * remote folder does not exist.
     */
    pub async fn upload_new_files(
        &self,
        remote_dir: &str,
        local_dir: &Path,
        move_to: &Path,
    ) -> AnyResult<Option<Vec<Entry>>> {
        let Some(folder) = self.remote_folder(remote_dir).await? else {
            return Ok(None);
        };
        let time_logger = TimeLogger::new(format!("Uploaded new files to {}", remote_dir));

        tokio::fs::create_dir_all(move_to)
            .await
            .map_err(|e| CloudFsError::local_io(move_to, e))?;
        let options = UploadOptions {
            keep_local_after_upload: true,
            parents: vec![folder.id.clone()],
            ..Default::default()
        };

        let mut uploaded = Vec::new();
        for source in scan_files(local_dir) {
            let Some(file_name) = source.file_name().and_then(|name| name.to_str()) else {
                warn!("Skipping {}: name is not valid UTF-8", source.display());
                continue;
            };
            let entry = match self.upload(file_name, &source, &options).await {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping {}: {}", source.display(), e);
                    continue;
                }
            };

            let moved = move_to.join(file_name);
            tokio::fs::rename(&source, &moved)
                .await
                .map_err(|e| CloudFsError::local_io(&source, e))?;
            uploaded.push(entry);
        }

        info!("{} files uploaded to {}", uploaded.len(), remote_dir);
        time_logger.complete();
        Ok(Some(uploaded))
    }
}
