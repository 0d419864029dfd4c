use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum::{Display, EnumString};

use crate::libs::constants::ROOT_ID;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// A file or folder record of a remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub name: String,
    // A store may allow an entry to live under several folders
    pub parents: BTreeSet<String>,
    pub size: u64,
    pub kind: EntryKind,
    pub mime_type: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Set when the entry was served by the query cache instead of a live call
    #[serde(default)]
    pub from_cache: bool,
}

impl Entry {
    pub fn folder(id: impl Into<String>, name: impl Into<String>, parent: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parents: BTreeSet::from([parent.to_string()]),
            size: 0,
            kind: EntryKind::Folder,
            mime_type: None,
            modified_at: None,
            properties: BTreeMap::new(),
            from_cache: false,
        }
    }

    pub fn file(id: impl Into<String>, name: impl Into<String>, parent: &str, size: u64) -> Self {
        Self {
            size,
            kind: EntryKind::File,
            ..Self::folder(id, name, parent)
        }
    }

    /// The top-level folder; it is never looked up remotely
    pub fn root() -> Self {
        Self {
            parents: BTreeSet::new(),
            ..Self::folder(ROOT_ID, "/", ROOT_ID)
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn has_parent(&self, parent_id: &str) -> bool {
        self.parents.contains(parent_id)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// One page of a child listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub entries: Vec<Entry>,
    pub next_page_token: Option<String>,
}

impl Page {
    pub fn new(entries: Vec<Entry>, next_page_token: Option<String>) -> Self {
        Self {
            entries,
            next_page_token,
        }
    }

    /// Copy of the page with every entry tagged as coming from the cache
    pub fn tagged_from_cache(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .cloned()
                .map(|mut entry| {
                    entry.from_cache = true;
                    entry
                })
                .collect(),
            next_page_token: self.next_page_token.clone(),
        }
    }
}

/// Metadata of a file about to be created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFile {
    pub name: String,
    pub parents: Vec<String>,
    pub mime_type: String,
    pub properties: BTreeMap<String, String>,
    /// Ask the store to convert the content to its native document format
    pub convert: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn root_has_no_parents() {
        let root = Entry::root();
        assert_eq!(root.id, ROOT_ID);
        assert!(root.is_folder());
        assert!(root.parents.is_empty());
    }

    #[test]
    fn kind_round_trips_through_strings() {
        assert_eq!(EntryKind::Folder.to_string(), "folder");
        assert_eq!(EntryKind::from_str("file").unwrap(), EntryKind::File);
    }

    #[test]
    fn cache_tagging_leaves_source_untouched() {
        let page = Page::new(vec![Entry::file("1", "a.txt", ROOT_ID, 3)], None);
        let tagged = page.tagged_from_cache();
        assert!(tagged.entries[0].from_cache);
        assert!(!page.entries[0].from_cache);
    }
}
