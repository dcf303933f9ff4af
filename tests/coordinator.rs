//! Coherence properties of the cache coordinator, exercised against
//! repositories that can fail, count loads, or load slowly.

use catalog_cache::backend::InMemoryBackend;
use catalog_cache::{
    Book, CacheBackend, CacheCoordinator, CatalogService, CounterMetrics, DataRepository, Error,
    InMemoryRepository, MemoryStore, Result, TtlPolicy, TtlUpdate, User,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn book(name: &str, year: i32) -> Book {
    Book {
        id: None,
        name: name.to_string(),
        description: String::new(),
        author: "Herbert".to_string(),
        year,
        publisher: "Chilton".to_string(),
    }
}

/// In-memory repository that can be switched offline, counts loads, and
/// optionally stalls after reading.
#[derive(Clone, Default)]
struct ScriptedRepository {
    inner: InMemoryRepository<Book>,
    offline: Arc<AtomicBool>,
    crash_on_write: Arc<AtomicBool>,
    loads: Arc<AtomicUsize>,
    load_delay: Duration,
}

impl ScriptedRepository {
    fn slow(load_delay: Duration) -> Self {
        ScriptedRepository {
            load_delay,
            ..Default::default()
        }
    }

    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("store offline".to_string()));
        }
        Ok(())
    }

    async fn stall(&self) {
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
    }
}

impl DataRepository<Book> for ScriptedRepository {
    async fn fetch_all(&self) -> Result<Vec<Book>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let books = self.inner.fetch_all().await?;
        self.stall().await;
        Ok(books)
    }

    async fn fetch_by_key(&self, key: &String) -> Result<Option<Book>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let book = self.inner.fetch_by_key(key).await?;
        self.stall().await;
        Ok(book)
    }

    async fn upsert(&self, entity: &Book) -> Result<()> {
        self.check_online()?;
        if self.crash_on_write.load(Ordering::SeqCst) {
            panic!("store driver crashed");
        }
        self.inner.upsert(entity).await
    }

    async fn delete_by_key(&self, key: &String) -> Result<()> {
        self.check_online()?;
        self.inner.delete_by_key(key).await
    }
}

/// Backend whose `set` can be switched to fail.
#[derive(Clone, Default)]
struct FlakyBackend {
    inner: InMemoryBackend,
    refuse_sets: Arc<AtomicBool>,
}

impl CacheBackend for FlakyBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        if self.refuse_sets.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("cache refused write".to_string()));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn update<F>(&self, key: &str, ttl: TtlUpdate, patch: F) -> Result<bool>
    where
        F: FnOnce(&[u8]) -> Result<Vec<u8>> + Send,
    {
        self.inner.update(key, ttl, patch).await
    }

    async fn health_check(&self) -> Result<bool> {
        self.inner.health_check().await
    }

    async fn clear_all(&self) -> Result<()> {
        self.inner.clear_all().await
    }
}

async fn raw_entries(backend: &InMemoryBackend, keys: &[&str]) -> Vec<Option<Vec<u8>>> {
    let mut entries = Vec::with_capacity(keys.len());
    for key in keys {
        entries.push(backend.get(key).await.expect("Failed to read cache"));
    }
    entries
}

#[tokio::test]
async fn test_failed_writes_leave_cache_bytes_unchanged() {
    let backend = InMemoryBackend::new();
    let repo = ScriptedRepository::default();
    repo.inner.insert(book("Dune", 1965));
    repo.inner.insert(book("Solaris", 1961));
    let books = CacheCoordinator::new(repo.clone(), backend.clone());

    books.get_all().await.expect("Failed to warm collection");
    books
        .get_by_key(&"Dune".to_string())
        .await
        .expect("Failed to warm item");
    books
        .get_by_key(&"Hyperion".to_string())
        .await
        .expect("Failed to cache absence");

    let keys = ["book:all", "book:item:Dune", "book:item:Hyperion"];
    let before = raw_entries(&backend, &keys).await;
    assert!(before.iter().all(Option::is_some));

    repo.go_offline();
    let upsert = books.upsert(book("Dune", 1966)).await;
    assert!(matches!(upsert, Err(Error::StoreUnavailable(_))));
    let insert = books.upsert(book("Hyperion", 1989)).await;
    assert!(matches!(insert, Err(Error::StoreUnavailable(_))));
    let delete = books.delete_by_key(&"Solaris".to_string()).await;
    assert!(matches!(delete, Err(Error::StoreUnavailable(_))));

    assert_eq!(raw_entries(&backend, &keys).await, before);
}

#[tokio::test]
async fn test_failed_load_caches_nothing() {
    let backend = InMemoryBackend::new();
    let repo = ScriptedRepository::default();
    repo.go_offline();
    let books = CacheCoordinator::new(repo, backend.clone());

    assert!(books.get_all().await.is_err());
    assert!(books.get_by_key(&"Dune".to_string()).await.is_err());
    assert!(backend.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_expiry_triggers_exactly_one_reload_per_shape() {
    let repo = ScriptedRepository::default();
    repo.inner.insert(book("Dune", 1965));
    let books = CacheCoordinator::new(repo.clone(), InMemoryBackend::new())
        .with_ttl_policy(TtlPolicy::Fixed(Duration::from_secs(60)));
    let dune = "Dune".to_string();

    for _ in 0..3 {
        books.get_all().await.expect("Failed to get all");
        books.get_by_key(&dune).await.expect("Failed to get");
    }
    assert_eq!(repo.loads(), 2);

    // Changes made behind the coordinator's back surface only after expiry
    repo.inner.insert(book("Dune", 1966));
    repo.inner.insert(book("Solaris", 1961));
    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(
        books.get_by_key(&dune).await.expect("Failed to get"),
        Some(book("Dune", 1965))
    );

    tokio::time::advance(Duration::from_secs(31)).await;
    for _ in 0..3 {
        let all = books.get_all().await.expect("Failed to get all");
        assert_eq!(all.len(), 2);
        let fresh = books.get_by_key(&dune).await.expect("Failed to get");
        assert_eq!(fresh.map(|b| b.year), Some(1966));
    }
    assert_eq!(repo.loads(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_share_one_load() {
    let repo = ScriptedRepository::slow(Duration::from_millis(100));
    repo.inner.insert(book("Dune", 1965));
    let books = CacheCoordinator::new(repo.clone(), InMemoryBackend::new());
    let dune = "Dune".to_string();

    let items = futures::future::join_all((0..16).map(|_| books.get_by_key(&dune))).await;
    for item in items {
        assert_eq!(item.expect("Failed to get"), Some(book("Dune", 1965)));
    }
    assert_eq!(repo.loads(), 1);

    let lists = futures::future::join_all((0..16).map(|_| books.get_all())).await;
    for list in lists {
        assert_eq!(list.expect("Failed to get all").len(), 1);
    }
    assert_eq!(repo.loads(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_write_during_slow_load_is_not_overwritten() {
    let repo = ScriptedRepository::slow(Duration::from_millis(100));
    repo.inner.insert(book("Dune", 1965));
    let books = CacheCoordinator::new(repo, InMemoryBackend::new());
    let dune = "Dune".to_string();

    // The load reads 1965, then stalls while the write lands
    let (loaded, written) = tokio::join!(books.get_by_key(&dune), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        books.upsert(book("Dune", 1966)).await
    });

    assert_eq!(
        loaded.expect("Failed to load").map(|b| b.year),
        Some(1965)
    );
    written.expect("Failed to upsert");

    let cached = books.get_by_key(&dune).await.expect("Failed to get");
    assert_eq!(cached.map(|b| b.year), Some(1966));
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_write_still_reaches_cache() {
    let repo = ScriptedRepository::slow(Duration::from_millis(100));
    repo.inner.insert(book("Dune", 1965));
    let books = Arc::new(CacheCoordinator::new(repo.clone(), InMemoryBackend::new()));
    let dune = "Dune".to_string();
    books.get_all().await.expect("Failed to warm collection");

    // A slow load takes the item gate and will cache 1965
    let loader = {
        let books = Arc::clone(&books);
        let dune = dune.clone();
        tokio::spawn(async move { books.get_by_key(&dune).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let write = tokio::time::timeout(
        Duration::from_millis(20),
        books.upsert(book("Dune", 1966)),
    )
    .await;
    assert!(write.is_err(), "write should still be waiting on the item gate");
    let stored = repo.inner.fetch_by_key(&dune).await.expect("Failed to read store");
    assert_eq!(stored.map(|b| b.year), Some(1966));

    let loaded = loader
        .await
        .expect("Loader panicked")
        .expect("Failed to load");
    assert_eq!(loaded.map(|b| b.year), Some(1965));

    // Let the abandoned write finish its cache sync
    tokio::time::sleep(Duration::from_millis(1)).await;

    let cached = books.get_by_key(&dune).await.expect("Failed to get");
    assert_eq!(cached.map(|b| b.year), Some(1966));
    let all = books.get_all().await.expect("Failed to get all");
    assert_eq!(all, vec![book("Dune", 1966)]);
    assert_eq!(repo.loads(), 2);
}

#[tokio::test]
async fn test_cache_failure_after_store_write_invalidates_item() {
    let backend = FlakyBackend::default();
    let repo = ScriptedRepository::default();
    repo.inner.insert(book("Dune", 1965));
    let metrics = Arc::new(CounterMetrics::new());
    let books = CacheCoordinator::new(repo, backend.clone()).with_metrics(metrics.clone());
    let dune = "Dune".to_string();

    books.get_all().await.expect("Failed to warm collection");
    books.get_by_key(&dune).await.expect("Failed to warm item");

    backend.refuse_sets.store(true, Ordering::SeqCst);
    let written = books
        .upsert(book("Dune", 1966))
        .await
        .expect("Store accepted the write");
    assert_eq!(written.year, 1966);

    assert!(!backend
        .exists("book:item:Dune")
        .await
        .expect("Failed to check"));
    assert_eq!(
        books.get_all().await.expect("Failed to get all"),
        vec![book("Dune", 1966)]
    );
    assert_eq!(
        books.get_by_key(&dune).await.expect("Failed to get"),
        Some(book("Dune", 1966))
    );
    assert!(metrics.snapshot().errors >= 2);
}

#[tokio::test]
async fn test_crashed_write_surfaces_as_repository_error() {
    let backend = InMemoryBackend::new();
    let repo = ScriptedRepository::default();
    repo.crash_on_write.store(true, Ordering::SeqCst);
    let books = CacheCoordinator::new(repo, backend.clone());

    let result = books.upsert(book("Dune", 1965)).await;
    assert!(matches!(result, Err(Error::RepositoryError(_))));
    assert!(backend.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_upsert_gives_collection_a_fresh_ttl() {
    let repo = ScriptedRepository::default();
    repo.inner.insert(book("Dune", 1965));
    let books = CacheCoordinator::new(repo.clone(), InMemoryBackend::new())
        .with_ttl_policy(TtlPolicy::Fixed(Duration::from_secs(60)));

    books.get_all().await.expect("Failed to warm collection");
    tokio::time::advance(Duration::from_secs(50)).await;
    books
        .upsert(book("Solaris", 1961))
        .await
        .expect("Failed to upsert");

    // Past the original expiry, inside the refreshed one
    tokio::time::advance(Duration::from_secs(20)).await;
    assert_eq!(books.get_all().await.expect("Failed to get all").len(), 2);
    assert_eq!(repo.loads(), 1);

    tokio::time::advance(Duration::from_secs(41)).await;
    books.get_all().await.expect("Failed to get all");
    assert_eq!(repo.loads(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_delete_keeps_collection_expiry() {
    let repo = ScriptedRepository::default();
    repo.inner.insert(book("Dune", 1965));
    repo.inner.insert(book("Solaris", 1961));
    let books = CacheCoordinator::new(repo.clone(), InMemoryBackend::new())
        .with_ttl_policy(TtlPolicy::Fixed(Duration::from_secs(60)));

    books.get_all().await.expect("Failed to warm collection");
    tokio::time::advance(Duration::from_secs(50)).await;
    books
        .delete_by_key(&"Dune".to_string())
        .await
        .expect("Failed to delete");

    assert_eq!(
        books.get_all().await.expect("Failed to get all"),
        vec![book("Solaris", 1961)]
    );
    assert_eq!(repo.loads(), 1);

    tokio::time::advance(Duration::from_secs(11)).await;
    books.get_all().await.expect("Failed to get all");
    assert_eq!(repo.loads(), 2);
}

#[tokio::test]
async fn test_dune_lifecycle_through_catalog() {
    let catalog = CatalogService::new(Arc::new(MemoryStore::new()), InMemoryBackend::new());
    let books = catalog.books();
    let dune = "Dune".to_string();

    books.get_all().await.expect("Failed to warm collection");
    books
        .upsert(book("Dune", 1965))
        .await
        .expect("Failed to upsert");

    let found = books
        .get_by_key(&dune)
        .await
        .expect("Failed to get")
        .expect("Dune not found");
    assert_eq!(found.author, "Herbert");
    assert_eq!(found.year, 1965);
    assert_eq!(found.publisher, "Chilton");

    let listed: Vec<_> = books
        .get_all()
        .await
        .expect("Failed to get all")
        .into_iter()
        .filter(|b| b.name == "Dune")
        .collect();
    assert_eq!(listed, vec![book("Dune", 1965)]);

    books.delete_by_key(&dune).await.expect("Failed to delete");
    assert!(books.get_by_key(&dune).await.expect("Failed to get").is_none());
    assert!(books
        .get_all()
        .await
        .expect("Failed to get all")
        .iter()
        .all(|b| b.name != "Dune"));

    assert_eq!(catalog.store().count("books"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_upserts_resolve_to_one_value() {
    let catalog = Arc::new(CatalogService::new(
        Arc::new(MemoryStore::new()),
        InMemoryBackend::new(),
    ));
    catalog
        .users()
        .get_all()
        .await
        .expect("Failed to warm collection");

    for round in 0..20 {
        let username = format!("user{}", round);
        let writers: Vec<_> = ["Ivanov I.I.", "Petrov P.P."]
            .into_iter()
            .map(|fio| {
                let catalog = Arc::clone(&catalog);
                let user = User {
                    id: None,
                    fio: fio.to_string(),
                    gender: "m".to_string(),
                    username: username.clone(),
                };
                tokio::spawn(async move { catalog.users().upsert(user).await })
            })
            .collect();
        for writer in writers {
            writer
                .await
                .expect("Writer panicked")
                .expect("Failed to upsert");
        }

        let user = catalog
            .users()
            .get_by_key(&username)
            .await
            .expect("Failed to get")
            .expect("User not found");
        assert!(user.fio == "Ivanov I.I." || user.fio == "Petrov P.P.");
        assert_eq!(user.username, username);

        let matching: Vec<_> = catalog
            .users()
            .get_all()
            .await
            .expect("Failed to get all")
            .into_iter()
            .filter(|u| u.username == username)
            .collect();
        assert_eq!(matching.len(), 1);
        assert!(matching[0].fio == "Ivanov I.I." || matching[0].fio == "Petrov P.P.");
    }

    assert_eq!(catalog.store().count("users"), 20);
}
