mod cipher;
mod gzip;
mod stream;

pub use cipher::*;
pub use gzip::*;
pub use stream::*;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};

use super::models::{Entry, UploadOptions};
use super::providers::ByteStream;
use crate::libs::constants::{ENCRYPTED_SUFFIX, GZIP_SUFFIX, TRANSFORMS_PROPERTY};
use crate::libs::error::{AnyResult, CloudFsError};

/// One reversible step applied to content on its way to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransformStage {
    Gzip,
    Encrypt,
}

impl TransformStage {
    pub fn suffix(&self) -> &'static str {
        match self {
            TransformStage::Gzip => GZIP_SUFFIX,
            TransformStage::Encrypt => ENCRYPTED_SUFFIX,
        }
    }
}

/**
 * A streaming byte transformation. `update` may hold data back, `finish`
 * flushes whatever is left and must be called exactly once.
 */
pub trait Transform: Send {
    fn update(&mut self, chunk: &[u8]) -> AnyResult<Vec<u8>>;
    fn finish(&mut self) -> AnyResult<Vec<u8>>;
}

/**
 * Ordered list of stages applied on upload and reversed on download.
 * Compression always comes before encryption.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPipeline {
    stages: Vec<TransformStage>,
}

impl TransferPipeline {
    pub fn new(stages: Vec<TransformStage>) -> Self {
        Self { stages }
    }

    pub fn for_upload(options: &UploadOptions) -> Self {
        let mut stages = Vec::new();
        if options.compress {
            stages.push(TransformStage::Gzip);
        }
        if options.encrypt {
            stages.push(TransformStage::Encrypt);
        }
        Self { stages }
    }

    /**
     * Stages applied to a stored entry. The recorded property is trusted when
     * present, otherwise the name suffixes are read back to front.
     */
    pub fn for_download(entry: &Entry) -> AnyResult<Self> {
        if let Some(recorded) = entry.property(TRANSFORMS_PROPERTY) {
            return Self::from_property(recorded);
        }

        let mut stages = Vec::new();
        let mut name = entry.name.as_str();
        if let Some(stripped) = name.strip_suffix(ENCRYPTED_SUFFIX) {
            stages.push(TransformStage::Encrypt);
            name = stripped;
        }
        if name.strip_suffix(GZIP_SUFFIX).is_some() {
            stages.push(TransformStage::Gzip);
        }
        stages.reverse();
        debug!("Inferred stages {:?} from the name '{}'", stages, entry.name);
        Ok(Self { stages })
    }

    fn from_property(value: &str) -> AnyResult<Self> {
        let stages = value
            .split(',')
            .map(str::trim)
            .filter(|stage| !stage.is_empty())
            .map(|stage| {
                TransformStage::from_str(stage)
                    .map_err(|_| CloudFsError::Unsupported(format!("transform '{}'", stage)))
            })
            .collect::<AnyResult<Vec<_>>>()?;
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[TransformStage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn needs_password(&self) -> bool {
        self.stages.contains(&TransformStage::Encrypt)
    }

    /// Value recorded in the entry property, e.g. `gzip,encrypt`
    pub fn property_value(&self) -> String {
        self.stages.iter().join(",")
    }

    /// Name under which content named `logical_name` is stored
    pub fn remote_name(&self, logical_name: &str) -> String {
        self.stages
            .iter()
            .fold(logical_name.to_string(), |name, stage| name + stage.suffix())
    }

    /// Name of the content once the stages are reversed
    pub fn logical_name(&self, remote_name: &str) -> String {
        let mut name = remote_name;
        for stage in self.stages.iter().rev() {
            if let Some(stripped) = name.strip_suffix(stage.suffix()) {
                name = stripped;
            }
        }
        name.to_string()
    }

    fn password(&self, password: Option<&str>) -> AnyResult<String> {
        password
            .map(str::to_string)
            .ok_or_else(|| CloudFsError::Config("encryption needs a password".to_string()))
    }

    /// Apply every stage in order
    pub fn encode(&self, input: ByteStream, password: Option<&str>) -> AnyResult<ByteStream> {
        let mut transforms: Vec<Box<dyn Transform>> = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            match stage {
                TransformStage::Gzip => transforms.push(Box::new(GzipEncode::new())),
                TransformStage::Encrypt => {
                    transforms.push(Box::new(Encrypt::new(&self.password(password)?)?))
                }
            }
        }
        Ok(pipe(input, transforms))
    }

    /// Reverse every stage, last one first
    pub fn decode(&self, input: ByteStream, password: Option<&str>) -> AnyResult<ByteStream> {
        let mut transforms: Vec<Box<dyn Transform>> = Vec::with_capacity(self.stages.len());
        for stage in self.stages.iter().rev() {
            match stage {
                TransformStage::Gzip => transforms.push(Box::new(GzipDecode::new())),
                TransformStage::Encrypt => {
                    transforms.push(Box::new(Decrypt::new(&self.password(password)?)))
                }
            }
        }
        Ok(pipe(input, transforms))
    }
}
