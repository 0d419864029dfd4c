pub mod cache;
pub mod client;
pub mod models;
pub mod pager;
pub mod providers;
pub mod remote;
pub mod resolver;
pub mod sync;
pub mod throttle;
pub mod transfer;

pub use cache::QueryCache;
pub use client::CloudFs;
pub use models::*;
pub use pager::ListingPager;
pub use providers::*;
pub use remote::Remote;
pub use resolver::{FolderCreator, PathResolver};
pub use sync::ExistingMarker;
pub use throttle::Throttle;
pub use transfer::{TransferPipeline, TransformStage};
