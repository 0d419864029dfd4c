use flate2::write::{GzDecoder, GzEncoder};
use flate2::Compression;
use std::io::Write;

use super::Transform;
use crate::libs::error::{AnyResult, CloudFsError};

fn already_finished() -> CloudFsError {
    CloudFsError::Unknown(anyhow::anyhow!("gzip stage used after finish"))
}

/// Gzip compression, fed chunk by chunk
pub struct GzipEncode {
    encoder: Option<GzEncoder<Vec<u8>>>,
}

impl GzipEncode {
    pub fn new() -> Self {
        Self {
            encoder: Some(GzEncoder::new(Vec::new(), Compression::default())),
        }
    }
}

impl Transform for GzipEncode {
    fn update(&mut self, chunk: &[u8]) -> AnyResult<Vec<u8>> {
        let encoder = self.encoder.as_mut().ok_or_else(already_finished)?;
        encoder.write_all(chunk)?;
        Ok(std::mem::take(encoder.get_mut()))
    }

    fn finish(&mut self) -> AnyResult<Vec<u8>> {
        let encoder = self.encoder.take().ok_or_else(already_finished)?;
        Ok(encoder.finish()?)
    }
}

/// Gzip decompression; fails on a corrupt or truncated member
pub struct GzipDecode {
    decoder: Option<GzDecoder<Vec<u8>>>,
}

impl GzipDecode {
    pub fn new() -> Self {
        Self {
            decoder: Some(GzDecoder::new(Vec::new())),
        }
    }
}

impl Transform for GzipDecode {
    fn update(&mut self, chunk: &[u8]) -> AnyResult<Vec<u8>> {
        let decoder = self.decoder.as_mut().ok_or_else(already_finished)?;
        decoder.write_all(chunk)?;
        Ok(std::mem::take(decoder.get_mut()))
    }

    fn finish(&mut self) -> AnyResult<Vec<u8>> {
        let decoder = self.decoder.take().ok_or_else(already_finished)?;
        Ok(decoder.finish()?)
    }
}
