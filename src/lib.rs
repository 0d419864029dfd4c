pub mod cloud;
pub mod libs;

pub use cloud::*;
pub use libs::config::CloudFsConfig;
pub use libs::error::{AnyResult, CloudFsError};
