mod dropbox;
mod memory;
mod traits;

pub use dropbox::*;
pub use memory::*;
pub use traits::*;

use serde::{Deserialize, Serialize};

use crate::libs::error::{AnyResult, CloudFsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[serde(rename = "memory")]
    Memory,
    #[serde(rename = "dropbox")]
    Dropbox,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Memory => "memory",
            ProviderType::Dropbox => "dropbox",
        }
    }

    pub fn from_str(s: &str) -> AnyResult<Self> {
        match s {
            "memory" => Ok(ProviderType::Memory),
            "dropbox" => Ok(ProviderType::Dropbox),
            _ => Err(CloudFsError::Unsupported(format!("provider '{}'", s))),
        }
    }
}
