use async_stream::try_stream;
use futures::{Stream, TryStreamExt};
use log::debug;

use super::models::*;
use super::remote::Remote;
use crate::libs::error::AnyResult;

/// Lazily walks every page of a folder listing, bypassing the query cache
pub struct ListingPager<'a> {
    remote: &'a Remote,
}

impl<'a> ListingPager<'a> {
    pub fn new(remote: &'a Remote) -> Self {
        Self { remote }
    }

    /**
     * Stream the children of `parent_id` in store order, one listing call per
     * page. Nothing is fetched until the stream is polled, and a failing call
     * ends the stream with its error after the entries already yielded.
     */
    pub fn list_children(
        &self,
        parent_id: &str,
        exclude_folders: bool,
    ) -> impl Stream<Item = AnyResult<Entry>> + Send + 'a {
        let remote = self.remote;
        let query = Query::children(parent_id, exclude_folders);
        try_stream! {
            let mut page_token: Option<String> = None;
            loop {
                let page = remote.list(&query, page_token.as_deref()).await?;
                debug!("Listed {} entries of {}", page.entries.len(), query.parent);
                for entry in page.entries {
                    yield entry;
                }
                match page.next_page_token {
                    Some(token) => page_token = Some(token),
                    None => break,
                }
            }
        }
    }

    pub async fn collect(&self, parent_id: &str, exclude_folders: bool) -> AnyResult<Vec<Entry>> {
        self.list_children(parent_id, exclude_folders)
            .try_collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::providers::MemoryStore;
    use crate::libs::config::CloudFsConfig;
    use crate::libs::constants::ROOT_ID;
    use futures::StreamExt;
    use rstest::*;
    use std::sync::Arc;

    fn remote(store: &Arc<MemoryStore>) -> Remote {
        let config = CloudFsConfig {
            throttle_ms: 0,
            ..Default::default()
        };
        Remote::new(store.clone(), &config)
    }

    #[rstest]
    #[tokio::test]
    async fn walks_every_page() {
        let store = Arc::new(MemoryStore::with_page_size(2));
        for i in 0..6 {
            store.insert_file(&format!("f{}", i), ROOT_ID, b"x");
        }
        let remote = remote(&store);

        let entries = ListingPager::new(&remote).collect(ROOT_ID, false).await.unwrap();
        let names: Vec<_> = entries.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["f0", "f1", "f2", "f3", "f4", "f5"]);
        assert_eq!(store.calls("list"), 3);
    }

    #[rstest]
    #[case(false, 3)]
    #[case(true, 2)]
    #[tokio::test]
    async fn folders_can_be_excluded(#[case] exclude_folders: bool, #[case] expected: usize) {
        let store = Arc::new(MemoryStore::new());
        store.insert_file("a", ROOT_ID, b"a");
        store.insert_folder("b", ROOT_ID);
        store.insert_file("c", ROOT_ID, b"c");
        let remote = remote(&store);

        let entries = ListingPager::new(&remote)
            .collect(ROOT_ID, exclude_folders)
            .await
            .unwrap();
        assert_eq!(entries.len(), expected);
    }

    #[rstest]
    #[tokio::test]
    async fn empty_folder_yields_nothing() {
        let store = Arc::new(MemoryStore::new());
        let remote = remote(&store);
        let entries = ListingPager::new(&remote).collect(ROOT_ID, false).await.unwrap();
        assert!(entries.is_empty());
        assert_eq!(store.calls("list"), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn nothing_is_fetched_until_polled() {
        let store = Arc::new(MemoryStore::with_page_size(1));
        store.insert_file("a", ROOT_ID, b"a");
        store.insert_file("b", ROOT_ID, b"b");
        let remote = remote(&store);

        let pager = ListingPager::new(&remote);
        let mut stream = Box::pin(pager.list_children(ROOT_ID, false));
        assert_eq!(store.calls("list"), 0);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.name, "a");
        assert_eq!(store.calls("list"), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn failing_page_ends_the_stream() {
        let store = Arc::new(MemoryStore::with_page_size(1));
        store.insert_file("a", ROOT_ID, b"a");
        store.insert_file("b", ROOT_ID, b"b");
        let remote = remote(&store);

        let pager = ListingPager::new(&remote);
        let mut stream = Box::pin(pager.list_children(ROOT_ID, false));
        assert!(stream.next().await.unwrap().is_ok());
        store.fail_next("list", "boom");
        assert!(stream.next().await.unwrap().is_err());
    }
}
