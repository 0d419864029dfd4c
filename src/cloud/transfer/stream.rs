use async_stream::try_stream;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::io::AsyncReadExt;

use super::Transform;
use crate::cloud::providers::ByteStream;
use crate::libs::constants::READ_CHUNK_SIZE;
use crate::libs::error::{AnyResult, CloudFsError};

fn update_all(transforms: &mut [Box<dyn Transform>], chunk: &[u8]) -> AnyResult<Vec<u8>> {
    let mut data = chunk.to_vec();
    for transform in transforms.iter_mut() {
        if data.is_empty() {
            break;
        }
        data = transform.update(&data)?;
    }
    Ok(data)
}

/// Finish every stage in order, pushing each one's tail through the next ones
fn finish_all(transforms: &mut [Box<dyn Transform>]) -> AnyResult<Vec<u8>> {
    let mut data = Vec::new();
    for transform in transforms.iter_mut() {
        let mut out = if data.is_empty() {
            Vec::new()
        } else {
            transform.update(&data)?
        };
        out.extend(transform.finish()?);
        data = out;
    }
    Ok(data)
}

fn transformed(
    mut input: ByteStream,
    mut transforms: Vec<Box<dyn Transform>>,
) -> impl Stream<Item = AnyResult<Bytes>> + Send {
    try_stream! {
        while let Some(chunk) = input.next().await {
            let out = update_all(&mut transforms, &chunk?)?;
            if !out.is_empty() {
                yield Bytes::from(out);
            }
        }
        let out = finish_all(&mut transforms)?;
        if !out.is_empty() {
            yield Bytes::from(out);
        }
    }
}

/// Run `input` through `transforms` in order
pub fn pipe(input: ByteStream, transforms: Vec<Box<dyn Transform>>) -> ByteStream {
    if transforms.is_empty() {
        return input;
    }
    Box::pin(transformed(input, transforms))
}

fn chunks_of(mut file: tokio::fs::File, path: PathBuf) -> impl Stream<Item = AnyResult<Bytes>> + Send {
    try_stream! {
        loop {
            let mut buffer = vec![0u8; READ_CHUNK_SIZE];
            let read = file
                .read(&mut buffer)
                .await
                .map_err(|e| CloudFsError::local_io(&path, e))?;
            if read == 0 {
                break;
            }
            buffer.truncate(read);
            yield Bytes::from(buffer);
        }
    }
}

/// Stream the content of a local file
pub async fn read_local(path: &Path) -> AnyResult<ByteStream> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| CloudFsError::local_io(path, e))?;
    Ok(Box::pin(chunks_of(file, path.to_path_buf())))
}

/**
 * Remembers the first error seen on a stream handed to someone else, so the
 * transfer can report that one instead of whatever the consumer made of it.
 */
#[derive(Clone, Default)]
pub struct FirstError {
    reason: Arc<OnceLock<String>>,
}

impl FirstError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&self, input: ByteStream) -> ByteStream {
        let reason = self.reason.clone();
        Box::pin(input.inspect_err(move |e| {
            let _ = reason.set(e.to_string());
        }))
    }

    /// Record `error` unless an earlier one was already seen
    pub fn record(&self, error: &CloudFsError) {
        let _ = self.reason.set(error.to_string());
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// The transfer error for `path`, built from the first recorded error or `fallback`
    pub fn transfer_error(&self, path: &Path, fallback: CloudFsError) -> CloudFsError {
        let reason = match self.reason.get() {
            Some(reason) => reason.clone(),
            None => fallback.to_string(),
        };
        CloudFsError::Transfer {
            path: path.to_path_buf(),
            reason,
        }
    }
}
