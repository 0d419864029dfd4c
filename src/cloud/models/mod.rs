pub(crate) mod entry;
pub(crate) mod options;
pub(crate) mod path;
pub(crate) mod query;

pub use entry::*;
pub use options::*;
pub use path::*;
pub use query::*;
