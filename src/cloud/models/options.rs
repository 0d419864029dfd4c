use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strum::{Display, EnumString};

use super::Entry;

/// Options accepted by `CloudFs::upload`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadOptions {
    /// Gzip the content before sending it, adds `.gz` to the remote name
    pub compress: bool,
    /// Encrypt the content before sending it, adds `.enc` to the remote name
    pub encrypt: bool,
    /// Ask the store to convert the file to its native document format
    pub convert: bool,
    /// MIME type to convert to, only used with `convert`
    pub mime_type: Option<String>,
    pub keep_local_after_upload: bool,
    /// Parent folders used when the remote name has no folder part
    pub parents: Vec<String>,
    /// Granted on the folder created for the upload
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PermissionKind {
    User,
    Group,
    Domain,
    Anyone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PermissionRole {
    Owner,
    Writer,
    Commenter,
    Reader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub kind: PermissionKind,
    pub role: PermissionRole,
    pub email_address: Option<String>,
    pub domain: Option<String>,
    pub allow_file_discovery: Option<bool>,
    pub expiration_time: Option<DateTime<Utc>>,
}

impl Permission {
    pub fn user(email_address: &str, role: PermissionRole) -> Self {
        Self {
            kind: PermissionKind::User,
            role,
            email_address: Some(email_address.to_string()),
            domain: None,
            allow_file_discovery: None,
            expiration_time: None,
        }
    }

    pub fn anyone(role: PermissionRole) -> Self {
        Self {
            kind: PermissionKind::Anyone,
            role,
            email_address: None,
            domain: None,
            allow_file_discovery: Some(false),
            expiration_time: None,
        }
    }
}

/// Result of granting a list of permissions on one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub id: String,
    /// Permission ids assigned by the store, in request order
    pub permission_ids: Vec<String>,
}

/// A finished download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Downloaded {
    pub entry: Entry,
    /// Name of the content once every transform has been reversed
    pub logical_name: String,
    pub local_path: PathBuf,
}
