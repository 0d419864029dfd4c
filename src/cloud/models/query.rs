use std::fmt;

use super::Entry;
use crate::libs::constants::ROOT_ID;

/// Predicate sent to a store's child listing.
///
/// Its text form is what the query cache is keyed by. Two queries that select
/// the same entries but render differently are different cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    pub name: Option<String>,
    pub parent: String,
    pub exclude_folders: bool,
}

impl Query {
    /// Entries called `name` directly under `parent` (root when `None`)
    pub fn named(name: &str, parent: Option<&str>) -> Self {
        Self {
            name: Some(name.to_string()),
            parent: parent.unwrap_or(ROOT_ID).to_string(),
            exclude_folders: false,
        }
    }

    /// Every child of `parent`
    pub fn children(parent: &str, exclude_folders: bool) -> Self {
        Self {
            name: None,
            parent: parent.to_string(),
            exclude_folders,
        }
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        if let Some(name) = &self.name {
            if &entry.name != name {
                return false;
            }
        }
        if self.exclude_folders && entry.is_folder() {
            return false;
        }
        entry.has_parent(&self.parent)
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "name = {} and ", quote(name))?;
        }
        write!(f, "{} in parents and trashed != true", quote(&self.parent))?;
        if self.exclude_folders {
            write!(f, " and kind != 'folder'")?;
        }
        Ok(())
    }
}
