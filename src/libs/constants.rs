// Remote hierarchy

/// Id alias of the top-level folder of a store
pub const ROOT_ID: &str = "root";

// Transfer pipeline

pub const GZIP_SUFFIX: &str = ".gz";
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// Entry property holding the ordered list of applied transforms, e.g. `gzip,encrypt`
pub const TRANSFORMS_PROPERTY: &str = "cloudfs.transforms";
/// Entry property holding the name of the uploaded local file
pub const ORIGINAL_NAME_PROPERTY: &str = "cloudfs.original_name";

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

// Chunk size used when streaming local files
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

// Config

pub const APP_NAME: &str = "cloudfs";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const PASSWORD_ENV_VAR: &str = "CLOUDFS_PASSWORD";
pub const DEFAULT_MARKER_FILE: &str = ".existing";
