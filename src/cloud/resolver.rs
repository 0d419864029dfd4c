use log::{debug, info};

use super::models::*;
use super::remote::Remote;
use crate::libs::constants::ROOT_ID;
use crate::libs::error::AnyResult;

/**
 * Walks a virtual path one component at a time, stopping at the first
 * component that has no match.
 *
 * When several siblings share a name, the first one in the store's listing
 * order wins. That order is up to the store, so such a walk is not
 * deterministic across stores or over time.
 */
pub struct PathResolver<'a> {
    remote: &'a Remote,
    cached: bool,
}

impl<'a> PathResolver<'a> {
    pub fn new(remote: &'a Remote) -> Self {
        Self {
            remote,
            cached: true,
        }
    }

    /// A resolver that always asks the store, for checks that must not be stale
    pub fn live(remote: &'a Remote) -> Self {
        Self {
            remote,
            cached: false,
        }
    }

    /// The entry at `path`, or `None` as soon as one component is missing
    pub async fn resolve(&self, path: &VirtualPath) -> AnyResult<Option<Entry>> {
        let mut current = Entry::root();
        for component in path.components() {
            match self.find_child(component, &current.id).await? {
                Some(entry) => current = entry,
                None => {
                    debug!("'{}' not found while resolving {}", component, path);
                    return Ok(None);
                }
            }
        }
        Ok(Some(current))
    }

    /// First entry called `name` directly under `parent_id`
    pub async fn find_child(&self, name: &str, parent_id: &str) -> AnyResult<Option<Entry>> {
        let query = Query::named(name, Some(parent_id));
        let mut page_token: Option<String> = None;
        loop {
            let page = if self.cached {
                self.remote.lookup(&query, page_token.as_deref()).await?
            } else {
                self.remote.list(&query, page_token.as_deref()).await?
            };
            if let Some(entry) = page.entries.into_iter().next() {
                return Ok(Some(entry));
            }
            // Stores filtering client side may hand out empty pages before a match
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(None),
            }
        }
    }
}

/**
 * `mkdir -p` over a remote store: the same walk as `PathResolver`, creating
 * each missing folder under the last resolved one.
 *
 * Two callers ensuring overlapping paths at the same time can both miss and
 * both create a folder, leaving same-named siblings. Nothing here prevents it
 * unless the store itself enforces unique names.
 */
pub struct FolderCreator<'a> {
    resolver: PathResolver<'a>,
    remote: &'a Remote,
}

impl<'a> FolderCreator<'a> {
    pub fn new(remote: &'a Remote) -> Self {
        Self {
            resolver: PathResolver::new(remote),
            remote,
        }
    }

    /// The folder at `path`, created along with any missing ancestor
    pub async fn ensure_path(&self, path: &VirtualPath) -> AnyResult<Entry> {
        let mut current = Entry::root();
        for component in path.components() {
            current = match self.resolver.find_child(component, &current.id).await? {
                Some(entry) => entry,
                None => self.create(component, &current.id).await?,
            };
        }
        Ok(current)
    }

    async fn create(&self, name: &str, parent_id: &str) -> AnyResult<Entry> {
        let parent = (parent_id != ROOT_ID).then_some(parent_id);
        let folder = self.remote.create_folder(name, parent).await?;
        info!("Created folder '{}' ({}) under {}", name, folder.id, parent_id);

        self.remote.remember(
            &Query::named(name, Some(parent_id)),
            Page::new(vec![folder.clone()], None),
        );
        Ok(folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::providers::MemoryStore;
    use crate::libs::config::CloudFsConfig;
    use crate::libs::error::CloudFsError;
    use rstest::*;
    use std::sync::Arc;

    #[fixture]
    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    fn remote(store: &Arc<MemoryStore>) -> Remote {
        let config = CloudFsConfig {
            throttle_ms: 0,
            ..Default::default()
        };
        Remote::new(store.clone(), &config)
    }

    fn path(value: &str) -> VirtualPath {
        VirtualPath::parse(value).unwrap()
    }

    #[rstest]
    #[tokio::test]
    async fn resolves_full_path(store: Arc<MemoryStore>) {
        let a = store.insert_folder("a", ROOT_ID);
        let b = store.insert_folder("b", &a.id);
        let c = store.insert_file("c.txt", &b.id, b"c");
        let remote = remote(&store);

        let found = PathResolver::new(&remote)
            .resolve(&path("/a/b/c.txt"))
            .await
            .unwrap();
        assert_eq!(found.map(|entry| entry.id), Some(c.id));
        assert_eq!(store.calls("list"), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn stops_at_first_missing_component(store: Arc<MemoryStore>) {
        store.insert_folder("a", ROOT_ID);
        let remote = remote(&store);

        let found = PathResolver::new(&remote)
            .resolve(&path("/a/missing/c/d"))
            .await
            .unwrap();
        assert!(found.is_none());
        assert_eq!(store.calls("list"), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn root_needs_no_call(store: Arc<MemoryStore>) {
        let remote = remote(&store);
        let found = PathResolver::new(&remote).resolve(&path("/")).await.unwrap();
        assert_eq!(found.map(|entry| entry.id), Some(ROOT_ID.to_string()));
        assert_eq!(store.total_calls(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn same_name_under_other_parent_is_ignored(store: Arc<MemoryStore>) {
        store.insert_folder("a", ROOT_ID);
        store.insert_folder("b", ROOT_ID);
        let remote = remote(&store);

        let found = PathResolver::new(&remote).resolve(&path("/a/b")).await.unwrap();
        assert!(found.is_none());
        assert_eq!(store.calls("list"), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn live_resolver_skips_the_cache(store: Arc<MemoryStore>) {
        store.insert_folder("a", ROOT_ID);
        let remote = remote(&store);
        PathResolver::new(&remote).resolve(&path("/a")).await.unwrap();

        let found = PathResolver::live(&remote).resolve(&path("/a")).await.unwrap().unwrap();
        assert!(!found.from_cache);
        assert_eq!(store.calls("list"), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn list_failure_is_an_error(store: Arc<MemoryStore>) {
        store.fail_next("list", "network down");
        let remote = remote(&store);

        let err = PathResolver::new(&remote).resolve(&path("/a")).await.unwrap_err();
        assert_eq!(err.operation(), Some("list"));
    }

    #[rstest]
    #[tokio::test]
    async fn ensure_creates_each_missing_level(store: Arc<MemoryStore>) {
        let remote = remote(&store);

        let c = FolderCreator::new(&remote).ensure_path(&path("/a/b/c")).await.unwrap();

        assert_eq!(store.calls("create_folder"), 3);
        let a = &store.folders_named("a")[0];
        let b = &store.folders_named("b")[0];
        assert!(a.has_parent(ROOT_ID));
        assert!(b.has_parent(&a.id));
        assert!(c.has_parent(&b.id));
        assert_eq!(c.name, "c");
    }

    #[rstest]
    #[tokio::test]
    async fn ensure_existing_path_creates_nothing(store: Arc<MemoryStore>) {
        let a = store.insert_folder("a", ROOT_ID);
        let b = store.insert_folder("b", &a.id);
        let remote = remote(&store);

        let found = FolderCreator::new(&remote).ensure_path(&path("/a/b")).await.unwrap();
        assert_eq!(found.id, b.id);
        assert_eq!(store.calls("create_folder"), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn ensure_then_resolve_hits_cache(store: Arc<MemoryStore>) {
        let remote = remote(&store);
        FolderCreator::new(&remote).ensure_path(&path("/x/y")).await.unwrap();
        store.reset_calls();

        let found = PathResolver::new(&remote).resolve(&path("/x/y")).await.unwrap().unwrap();
        assert!(found.from_cache);
        assert_eq!(store.total_calls(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn ensure_surfaces_create_failure(store: Arc<MemoryStore>) {
        store.insert_folder("a", ROOT_ID);
        store.fail_next("create_folder", "quota exceeded");
        let remote = remote(&store);

        let err = FolderCreator::new(&remote).ensure_path(&path("/a/b")).await.unwrap_err();
        assert!(matches!(err, CloudFsError::RemoteCall { operation: "create_folder", .. }));
    }
}
