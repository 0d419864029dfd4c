use cloudfs::libs::constants::ROOT_ID;
use cloudfs::{CloudFs, CloudFsConfig, CloudFsError, MemoryStore};
use rstest::*;
use std::sync::Arc;
use std::time::Duration;
use test_log::test as log_test;

fn config() -> CloudFsConfig {
    CloudFsConfig {
        throttle_ms: 0,
        ..Default::default()
    }
}

#[fixture]
fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

#[log_test(rstest)]
#[case("/a", 1)]
#[case("/a/b", 2)]
#[case("/a/b/c", 3)]
#[case("/a/x/c", 2)]
#[case("/x/b/c", 1)]
#[tokio::test]
async fn resolution_costs_at_most_one_call_per_component(
    store: Arc<MemoryStore>,
    #[case] path: &str,
    #[case] expected_calls: usize,
) {
    let a = store.insert_folder("a", ROOT_ID);
    let b = store.insert_folder("b", &a.id);
    store.insert_folder("c", &b.id);
    let fs = CloudFs::new(store.clone(), config());

    fs.resolve_path(path).await.unwrap();
    assert_eq!(store.calls("list"), expected_calls);
    assert_eq!(store.total_calls(), expected_calls);
}

#[rstest]
#[tokio::test]
async fn missing_path_is_absent_not_an_error(store: Arc<MemoryStore>) {
    let fs = CloudFs::new(store.clone(), config());
    assert_eq!(fs.resolve_path("/nowhere/at/all").await.unwrap(), None);
    assert_eq!(fs.list_files("/nowhere").await.unwrap(), None);
}

#[rstest]
#[tokio::test]
async fn malformed_path_is_rejected(store: Arc<MemoryStore>) {
    let fs = CloudFs::new(store.clone(), config());
    let err = fs.resolve_path("/a//b").await.unwrap_err();
    assert!(matches!(err, CloudFsError::Path(_)));
    assert_eq!(store.total_calls(), 0);
}

#[log_test(rstest)]
#[tokio::test]
async fn ensure_path_creates_the_chain(store: Arc<MemoryStore>) {
    let fs = CloudFs::new(store.clone(), config());

    let c = fs.ensure_path("/a/b/c").await.unwrap();

    assert_eq!(store.calls("create_folder"), 3);
    let a = store.folders_named("a").remove(0);
    let b = store.folders_named("b").remove(0);
    assert!(a.has_parent(ROOT_ID));
    assert!(b.has_parent(&a.id));
    assert!(c.has_parent(&b.id));
    assert_eq!(c.name, "c");
}

#[rstest]
#[tokio::test]
async fn ensure_path_reuses_existing_folders(store: Arc<MemoryStore>) {
    let a = store.insert_folder("a", ROOT_ID);
    let b = store.insert_folder("b", &a.id);
    let c = store.insert_folder("c", &b.id);
    let fs = CloudFs::new(store.clone(), config());

    let found = fs.ensure_path("/a/b/c").await.unwrap();
    assert_eq!(found.id, c.id);
    assert_eq!(store.calls("create_folder"), 0);
}

#[rstest]
#[tokio::test]
async fn ensure_path_completes_a_partial_chain(store: Arc<MemoryStore>) {
    let a = store.insert_folder("a", ROOT_ID);
    let fs = CloudFs::new(store.clone(), config());

    let c = fs.ensure_path("/a/b/c").await.unwrap();
    assert_eq!(store.calls("create_folder"), 2);
    assert_eq!(store.folders_named("a").len(), 1);
    assert!(store.folders_named("b")[0].has_parent(&a.id));
    assert_eq!(c.name, "c");
}

#[tokio::test]
async fn listing_follows_every_page() {
    let store = Arc::new(MemoryStore::with_page_size(2));
    let docs = store.insert_folder("docs", ROOT_ID);
    for i in 0..6 {
        store.insert_file(&format!("{}.txt", i), &docs.id, b"x");
    }
    store.insert_folder("nested", &docs.id);
    let fs = CloudFs::new(store.clone(), config());

    let docs_id = fs.resolve_path("/docs").await.unwrap().unwrap().id;
    store.reset_calls();

    let files = fs.pager().collect(&docs_id, true).await.unwrap();
    assert_eq!(files.len(), 6);
    assert!(files.iter().all(|entry| entry.is_file()));
    assert_eq!(store.calls("list"), 3);

    let listed = fs.list_files("/docs").await.unwrap().unwrap();
    assert_eq!(listed, files);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn cached_walk_until_ttl_expires(store: Arc<MemoryStore>) {
    let a = store.insert_folder("a", ROOT_ID);
    store.insert_folder("b", &a.id);
    let fs = CloudFs::new(
        store.clone(),
        CloudFsConfig {
            cache_ttl_secs: 60,
            ..config()
        },
    );

    let live = fs.resolve_path("/a/b").await.unwrap().unwrap();
    assert!(!live.from_cache);
    assert_eq!(store.calls("list"), 2);

    let cached = fs.resolve_path("/a/b").await.unwrap().unwrap();
    assert!(cached.from_cache);
    assert_eq!(store.calls("list"), 2);

    tokio::time::advance(Duration::from_secs(61)).await;
    let refreshed = fs.resolve_path("/a/b").await.unwrap().unwrap();
    assert!(!refreshed.from_cache);
    assert_eq!(store.calls("list"), 4);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn remote_calls_are_throttled(store: Arc<MemoryStore>) {
    let a = store.insert_folder("a", ROOT_ID);
    store.insert_folder("b", &a.id);
    let fs = CloudFs::new(
        store.clone(),
        CloudFsConfig {
            throttle_ms: 500,
            ..Default::default()
        },
    );

    let start = tokio::time::Instant::now();
    fs.ensure_path("/a/b/c").await.unwrap();
    // Three lookups and one creation, the first one is free
    assert!(start.elapsed() >= Duration::from_millis(1500));
    assert_eq!(store.total_calls(), 4);
}

#[rstest]
#[tokio::test]
async fn move_reparents_and_renames(store: Arc<MemoryStore>) {
    let from = store.insert_folder("from", ROOT_ID);
    let to = store.insert_folder("to", ROOT_ID);
    let file = store.insert_file("old.txt", &from.id, b"content");
    let fs = CloudFs::new(store.clone(), config());
    assert!(fs.resolve_path("/from/old.txt").await.unwrap().is_some());

    let moved = fs.move_entry("/from/old.txt", "/to/new.txt").await.unwrap();

    assert_eq!(moved.id, file.id);
    assert_eq!(moved.name, "new.txt");
    assert!(moved.has_parent(&to.id));
    assert!(!moved.has_parent(&from.id));
    assert_eq!(fs.resolve_path("/from/old.txt").await.unwrap(), None);
    assert_eq!(
        fs.resolve_path("/to/new.txt").await.unwrap().map(|entry| entry.id),
        Some(file.id)
    );
}

#[rstest]
#[tokio::test]
async fn move_onto_occupied_path_changes_nothing(store: Arc<MemoryStore>) {
    let from = store.insert_folder("from", ROOT_ID);
    let to = store.insert_folder("to", ROOT_ID);
    store.insert_file("a.txt", &from.id, b"a");
    store.insert_file("b.txt", &to.id, b"b");
    let fs = CloudFs::new(store.clone(), config());
    let before = store.entries();

    let err = fs.move_entry("/from/a.txt", "/to/b.txt").await.unwrap_err();

    assert!(matches!(err, CloudFsError::Conflict(_)));
    assert_eq!(store.calls("move"), 0);
    assert_eq!(store.entries(), before);
}

#[rstest]
#[case("/missing.txt", "/to/b.txt")]
#[case("/from/a.txt", "/nowhere/b.txt")]
#[tokio::test]
async fn move_with_missing_side_is_not_found(
    store: Arc<MemoryStore>,
    #[case] src: &str,
    #[case] dst: &str,
) {
    let from = store.insert_folder("from", ROOT_ID);
    store.insert_folder("to", ROOT_ID);
    store.insert_file("a.txt", &from.id, b"a");
    let fs = CloudFs::new(store.clone(), config());

    let err = fs.move_entry(src, dst).await.unwrap_err();
    assert!(matches!(err, CloudFsError::NotFound(_)));
    assert_eq!(store.calls("move"), 0);
}

#[rstest]
#[tokio::test]
async fn store_failure_names_the_operation(store: Arc<MemoryStore>) {
    store.fail_next("create_folder", "quota exceeded");
    let fs = CloudFs::new(store.clone(), config());

    let err = fs.ensure_path("/a").await.unwrap_err();
    assert_eq!(err.operation(), Some("create_folder"));
    assert!(err.to_string().contains("quota exceeded"));
}
