use async_trait::async_trait;
use meta_cache::model::*;
use meta_cache::prelude::*;
use meta_cache::test::*;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn t1() -> TableRef {
    TableRef::new("dbo", "orders", 1)
}

fn t2() -> TableRef {
    TableRef::new("dbo", "customers", 2)
}

fn two_columns() -> TableFixture {
    TableFixture {
        columns: vec![column("colA", 1, 1), column("colB", 2, 2)],
        ..Default::default()
    }
}

fn column_cache(source: &Arc<MockSource>) -> Arc<ChildCache<ColumnLoader<MockSource>>> {
    ChildCache::builder()
        .loader(ColumnLoader::new(Arc::clone(source)))
        .name("dbo.columns")
        .build()
        .unwrap()
}

fn names(columns: &[TableColumn]) -> Vec<&str> {
    columns.iter().map(|c| c.name.as_str()).collect()
}

#[tokio::test]
async fn never_accessed_parent_is_unloaded() -> Result<()> {
    init_tracing();
    let source = shared(MockSource::new().with_table(1, two_columns()));
    let cache = column_cache(&source);

    assert_eq!(cache.status(&t1()).await, EntryStatus::Unloaded);
    assert_eq!(cache.cached_children(&t1()).await, None);
    assert_eq!(source.calls(SourceCall::Columns, 1), 0);

    cache.get_children(&t1()).await?;
    assert_eq!(source.calls(SourceCall::Columns, 1), 1);
    assert_eq!(cache.status(&t1()).await, EntryStatus::Loaded);
    Ok(())
}

#[tokio::test]
async fn loaded_children_are_memoized_in_loader_order() -> Result<()> {
    let source = shared(MockSource::new().with_table(1, two_columns()));
    let cache = column_cache(&source);

    let first = cache.get_children(&t1()).await?;
    let second = cache.get_children(&t1()).await?;

    assert_eq!(names(&first), vec!["colA", "colB"]);
    assert!(Arc::ptr_eq(&first, &second), "same collection instance expected");
    assert_eq!(source.calls(SourceCall::Columns, 1), 1);
    Ok(())
}

#[tokio::test]
async fn failure_is_cached_until_cleared() -> Result<()> {
    let source = shared(MockSource::new().with_table(1, two_columns()));
    source.fail(1, SourceError::ConnectionLost("connection lost".into()));
    let cache = column_cache(&source);

    let err = cache.get_children(&t1()).await.unwrap_err();
    assert!(matches!(err, LoadError::Failed { .. }));
    assert_eq!(err.cause(), Some(&SourceError::ConnectionLost("connection lost".into())));
    assert!(err.to_string().ends_with("connection lost"), "unexpected message: {err}");
    assert_eq!(err.parent(), "dbo.orders");
    assert_eq!(cache.status(&t1()).await, EntryStatus::Failed);

    // The source is fine again, but nothing is retried behind the caller's back.
    source.recover(1);
    let again = cache.get_children(&t1()).await.unwrap_err();
    assert_eq!(again.to_string(), err.to_string());
    assert_eq!(source.calls(SourceCall::Columns, 1), 1);

    cache.clear(&t1()).await;
    let children = cache.get_children(&t1()).await?;
    assert_eq!(names(&children), vec!["colA", "colB"]);
    assert_eq!(source.calls(SourceCall::Columns, 1), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_access_loads_once() -> Result<()> {
    let source = shared(MockSource::new().with_table(1, two_columns()));
    source.close_gate();
    let cache = column_cache(&source);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(async move { cache.get_children(&t1()).await }));
    }

    assert!(source.wait_for_calls(SourceCall::Columns, 1, 1).await);
    assert_eq!(cache.status(&t1()).await, EntryStatus::Loading);
    tokio::time::sleep(Duration::from_millis(20)).await;
    source.open_gate();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await??);
    }

    assert_eq!(source.calls(SourceCall::Columns, 1), 1);
    for children in &results {
        assert!(Arc::ptr_eq(children, &results[0]));
    }
    assert_eq!(names(&results[0]), vec!["colA", "colB"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_the_failure() -> Result<()> {
    let source = shared(MockSource::new().with_table(1, two_columns()));
    source.fail(1, SourceError::Query("permission denied".into()));
    source.set_delay(Duration::from_millis(30));
    let cache = column_cache(&source);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(async move { cache.get_children(&t1()).await }));
    }

    for task in tasks {
        let err = task.await?.unwrap_err();
        assert_eq!(err.cause(), Some(&SourceError::Query("permission denied".into())));
    }
    assert_eq!(source.calls(SourceCall::Columns, 1), 1);
    Ok(())
}

#[tokio::test]
async fn clear_reloads_only_that_parent() -> Result<()> {
    let source = shared(
        MockSource::new()
            .with_table(1, two_columns())
            .with_table(2, TableFixture {
                columns: vec![column("id", 1, 1)],
                ..Default::default()
            }),
    );
    let cache = column_cache(&source);

    let before = cache.get_children(&t1()).await?;
    let other = cache.get_children(&t2()).await?;

    cache.clear(&t1()).await;
    assert_eq!(cache.status(&t1()).await, EntryStatus::Unloaded);
    assert_eq!(cache.status(&t2()).await, EntryStatus::Loaded);

    let after = cache.get_children(&t1()).await?;
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(source.calls(SourceCall::Columns, 1), 2);

    let other_again = cache.get_children(&t2()).await?;
    assert!(Arc::ptr_eq(&other, &other_again));
    assert_eq!(source.calls(SourceCall::Columns, 2), 1);
    Ok(())
}

#[tokio::test]
async fn clear_of_unknown_parent_is_harmless() {
    let source = shared(MockSource::new());
    let cache = column_cache(&source);

    cache.clear(&t1()).await;
    cache.clear_all();
    cache.evict(&t2()).await;

    assert_eq!(cache.status(&t1()).await, EntryStatus::Unloaded);
    assert_eq!(cache.generation(&t1()).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cleared_in_flight_load_does_not_resurrect_entry() -> Result<()> {
    let source = shared(MockSource::new().with_table(1, two_columns()));
    source.close_gate();
    let cache = column_cache(&source);

    let loading = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_children(&t1()).await })
    };
    assert!(source.wait_for_calls(SourceCall::Columns, 1, 1).await);

    cache.clear(&t1()).await;
    assert_eq!(cache.status(&t1()).await, EntryStatus::Unloaded);
    source.open_gate();

    // The caller which started the load still gets what it asked for...
    let stale = loading.await??;
    assert_eq!(names(&stale), vec!["colA", "colB"]);
    // ...but the entry stays unloaded.
    assert_eq!(cache.status(&t1()).await, EntryStatus::Unloaded);
    assert_eq!(cache.cached_children(&t1()).await, None);

    let fresh = cache.get_children(&t1()).await?;
    assert!(!Arc::ptr_eq(&stale, &fresh));
    assert_eq!(source.calls(SourceCall::Columns, 1), 2);
    assert_eq!(cache.status(&t1()).await, EntryStatus::Loaded);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn clear_all_during_in_flight_load_does_not_resurrect() -> Result<()> {
    let source = shared(MockSource::new().with_table(1, two_columns()).with_table(2, two_columns()));
    let cache = column_cache(&source);
    cache.get_children(&t2()).await?;

    source.close_gate();
    let loading = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_children(&t1()).await })
    };
    assert!(source.wait_for_calls(SourceCall::Columns, 1, 1).await);

    cache.clear_all();
    assert_eq!(cache.status(&t1()).await, EntryStatus::Unloaded);
    assert_eq!(cache.status(&t2()).await, EntryStatus::Unloaded);
    source.open_gate();

    let stale = loading.await??;
    assert_eq!(cache.status(&t1()).await, EntryStatus::Unloaded);
    assert_eq!(cache.cached_children(&t1()).await, None);

    let fresh = cache.get_children(&t1()).await?;
    assert!(!Arc::ptr_eq(&stale, &fresh));
    assert_eq!(source.calls(SourceCall::Columns, 1), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn waiters_of_a_stale_load_load_again() -> Result<()> {
    let source = shared(MockSource::new().with_table(1, two_columns()));
    source.close_gate();
    let cache = column_cache(&source);

    let first = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_children(&t1()).await })
    };
    assert!(source.wait_for_calls(SourceCall::Columns, 1, 1).await);

    cache.clear(&t1()).await;

    let second = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_children(&t1()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    source.open_gate();

    let stale = first.await??;
    let fresh = second.await??;

    assert_eq!(source.calls(SourceCall::Columns, 1), 2);
    assert!(!Arc::ptr_eq(&stale, &fresh));
    let cached = cache.cached_children(&t1()).await.expect("entry must be loaded");
    assert!(Arc::ptr_eq(&cached, &fresh));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abandoned_load_still_populates_entry() -> Result<()> {
    let source = shared(MockSource::new().with_table(1, two_columns()));
    source.close_gate();
    let cache = column_cache(&source);

    let caller = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_children(&t1()).await })
    };
    assert!(source.wait_for_calls(SourceCall::Columns, 1, 1).await);
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    source.open_gate();
    for _ in 0..1000 {
        if cache.status(&t1()).await.is_loaded() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(cache.status(&t1()).await, EntryStatus::Loaded);
    cache.get_children(&t1()).await?;
    assert_eq!(source.calls(SourceCall::Columns, 1), 1);
    Ok(())
}

#[tokio::test]
async fn get_child_by_name_and_id() -> Result<()> {
    let source = shared(MockSource::new().with_table(1, two_columns()));
    let cache = column_cache(&source);

    let by_name = cache.get_child(&t1(), "colB").await?;
    assert_eq!(by_name.map(|c| c.object_id), Some(2));

    let by_id = cache.get_child(&t1(), 1i64).await?;
    assert_eq!(by_id.map(|c| c.name), Some("colA".to_string()));

    assert_eq!(cache.get_child(&t1(), "colC").await?, None);
    assert_eq!(cache.get_child(&t1(), ChildId::ObjectId(42)).await?, None);
    assert_eq!(source.calls(SourceCall::Columns, 1), 1);
    Ok(())
}

#[tokio::test]
async fn get_child_propagates_load_failure() {
    let source = shared(MockSource::new());
    let cache = column_cache(&source);

    // No fixture for the table.
    let err = cache.get_child(&t1(), "id").await.unwrap_err();
    assert!(matches!(err.cause(), Some(SourceError::Query(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn explicit_population_wins_over_in_flight_load() -> Result<()> {
    let source = shared(MockSource::new().with_table(1, two_columns()));
    source.close_gate();
    let cache = column_cache(&source);

    let loading = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_children(&t1()).await })
    };
    assert!(source.wait_for_calls(SourceCall::Columns, 1, 1).await);

    let seeded = cache.cache_children(&t1(), vec![column("seeded", 9, 1)]).await;
    source.open_gate();
    loading.await??;

    let cached = cache.get_children(&t1()).await?;
    assert!(Arc::ptr_eq(&seeded, &cached));
    assert_eq!(names(&cached), vec!["seeded"]);
    assert_eq!(source.calls(SourceCall::Columns, 1), 1);
    Ok(())
}

#[tokio::test]
async fn cache_object_appends_copy_on_write() -> Result<()> {
    let source = shared(MockSource::new().with_table(1, two_columns()));
    let cache = column_cache(&source);

    let snapshot = cache.get_children(&t1()).await?;
    cache.cache_object(&t1(), column("colC", 3, 3)).await;

    let updated = cache.get_children(&t1()).await?;
    assert_eq!(names(&snapshot), vec!["colA", "colB"]);
    assert_eq!(names(&updated), vec!["colA", "colB", "colC"]);

    // Without a loaded collection the object becomes the only member.
    cache.cache_object(&t2(), column("id", 1, 1)).await;
    assert_eq!(names(&cache.get_children(&t2()).await?), vec!["id"]);
    assert_eq!(source.calls(SourceCall::Columns, 2), 0);
    Ok(())
}

#[tokio::test]
async fn clear_all_and_evict() -> Result<()> {
    let source = shared(MockSource::new().with_table(1, two_columns()).with_table(2, two_columns()));
    let cache = column_cache(&source);

    cache.get_children(&t1()).await?;
    cache.get_children(&t2()).await?;

    cache.clear_all();
    assert_eq!(cache.status(&t1()).await, EntryStatus::Unloaded);
    assert_eq!(cache.status(&t2()).await, EntryStatus::Unloaded);

    cache.get_children(&t1()).await?;
    assert_eq!(source.calls(SourceCall::Columns, 1), 2);

    let generation = cache.generation(&t1()).await;
    assert!(generation > 0);
    cache.evict(&t1()).await;
    assert_eq!(cache.status(&t1()).await, EntryStatus::Unloaded);
    assert_eq!(cache.generation(&t1()).await, 0);

    cache.get_children(&t1()).await?;
    assert_eq!(source.calls(SourceCall::Columns, 1), 3);
    Ok(())
}

#[tokio::test]
async fn builder_settings() {
    let source = shared(MockSource::new());
    let cache = ChildCache::<ColumnLoader<MockSource>>::builder()
        .loader(ColumnLoader::new(source))
        .name("presized")
        .initial_capacity(100)
        .build()
        .unwrap();

    assert_eq!(cache.name(), "presized");
    assert_eq!(cache.initial_capacity(), 100);
    assert_eq!(CacheConfig::default().initial_capacity, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_parents_never_displace_a_tracked_entry() -> Result<()> {
    let source = shared(MockSource::new());
    for id in 1..=50 {
        source.set_table(id, two_columns());
    }
    let cache = ChildCache::<ColumnLoader<MockSource>>::builder()
        .loader(ColumnLoader::new(Arc::clone(&source)))
        .name("presized")
        .initial_capacity(1)
        .build()
        .unwrap();

    source.close_gate();
    let loading = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_children(&t1()).await })
    };
    assert!(source.wait_for_calls(SourceCall::Columns, 1, 1).await);

    for id in 2..=50 {
        cache.cache_children(&TableRef::new("dbo", format!("t{id}"), id), vec![]).await;
    }

    let waiting = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_children(&t1()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cache.status(&t1()).await, EntryStatus::Loading);
    source.open_gate();

    let first = loading.await??;
    let second = waiting.await??;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(source.calls(SourceCall::Columns, 1), 1);

    for id in 51..=100 {
        cache.cache_children(&TableRef::new("dbo", format!("t{id}"), id), vec![]).await;
    }
    let cached = cache.cached_children(&t1()).await.expect("entry must stay loaded");
    assert!(Arc::ptr_eq(&cached, &first));
    assert_eq!(source.calls(SourceCall::Columns, 1), 1);
    Ok(())
}

#[derive(Debug, thiserror::Error)]
#[error("never happens")]
struct Never;

#[derive(Default)]
struct PanickingLoader {
    calls: AtomicUsize,
}

#[async_trait]
impl ChildLoader for PanickingLoader {
    type Child = String;
    type Error = Never;
    type Parent = String;

    async fn load_children(&self, _parent: &String, _ctx: &LoadContext) -> std::result::Result<Vec<String>, Never> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("loader exploded");
    }
}

#[tokio::test]
async fn panicking_loader_leaves_entry_failed() {
    let loader = Arc::new(PanickingLoader::default());
    let cache = ChildCache::<PanickingLoader>::builder()
        .loader(Arc::clone(&loader))
        .name("panicky")
        .build()
        .unwrap();
    let parent = "t".to_string();

    let err = cache.get_children(&parent).await.unwrap_err();
    assert!(matches!(err, LoadError::Aborted { .. }));
    assert_eq!(cache.status(&parent).await, EntryStatus::Failed);

    let again = cache.get_children(&parent).await.unwrap_err();
    assert_eq!(again.to_string(), err.to_string());
    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
}

#[derive(Default)]
struct WatchfulLoader {
    entered:   Notify,
    resume:    Notify,
    saw_stale: AtomicBool,
}

#[async_trait]
impl ChildLoader for WatchfulLoader {
    type Child = String;
    type Error = Never;
    type Parent = String;

    async fn load_children(&self, parent: &String, ctx: &LoadContext) -> std::result::Result<Vec<String>, Never> {
        assert_eq!(ctx.cache_name(), "watchful");
        assert_eq!(ctx.parent(), parent.as_str());
        assert!(!ctx.is_stale());
        self.entered.notify_one();
        self.resume.notified().await;
        self.saw_stale.store(ctx.is_stale(), Ordering::SeqCst);
        Ok(vec![format!("{parent}.child")])
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loader_can_observe_staleness() -> Result<()> {
    let loader = Arc::new(WatchfulLoader::default());
    let cache = ChildCache::<WatchfulLoader>::builder()
        .loader(Arc::clone(&loader))
        .name("watchful")
        .build()
        .unwrap();
    let parent = "t".to_string();

    let loading = {
        let cache = Arc::clone(&cache);
        let parent = parent.clone();
        tokio::spawn(async move { cache.get_children(&parent).await })
    };

    loader.entered.notified().await;
    cache.clear(&parent).await;
    loader.resume.notify_one();

    assert_eq!(*loading.await??, vec!["t.child".to_string()]);
    assert!(loader.saw_stale.load(Ordering::SeqCst));
    assert_eq!(cache.status(&parent).await, EntryStatus::Unloaded);
    Ok(())
}
