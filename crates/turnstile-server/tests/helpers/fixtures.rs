//! Stores, caches and apps wired for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{Value, json};
use turnstile_core::{LookupKey, NewUser, PhoneNumber, User, UserStatus};
use turnstile_server::cache::{
    CacheEntry, CacheError, CachePolicy, CacheStore, EntryState, MokaCacheConfig, MokaCacheStore,
};
use turnstile_server::{AdmissionController, AppState, create_router_with_state};
use turnstile_store::{MemoryUserStore, Page, StoreError, UserPage, UserStore};

use super::client::TestClient;

/// Memory store that counts phone lookups and can be slowed down or broken.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryUserStore,
    lookups: AtomicU32,
    delay_ms: AtomicU32,
    failing: AtomicBool,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        let store = Self::default();
        store.delay_ms.store(delay.as_millis() as u32, Ordering::SeqCst);
        store
    }

    pub fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    async fn pause(&self) {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(u64::from(delay))).await;
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UserStore for CountingStore {
    async fn find_by_phone(&self, phone: &PhoneNumber) -> Result<User, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check()?;
        self.inner.find_by_phone(phone).await
    }

    async fn find_by_id(&self, id: i64) -> Result<User, StoreError> {
        self.check()?;
        self.inner.find_by_id(id).await
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        self.check()?;
        self.inner.insert(user).await
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        self.check()?;
        self.inner.update(user).await
    }

    async fn delete(&self, phone: &PhoneNumber) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(phone).await
    }

    async fn list(&self, page: Page) -> Result<UserPage, StoreError> {
        self.check()?;
        self.inner.list(page).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.check()
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// Cache backend that is always down.
pub struct FailingCache;

#[async_trait]
impl CacheStore for FailingCache {
    async fn get(&self, _key: &LookupKey) -> Result<Option<CacheEntry>, CacheError> {
        Err(CacheError::Unavailable("cache offline".into()))
    }

    async fn set_with_ttl(
        &self,
        _key: &LookupKey,
        _state: EntryState,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("cache offline".into()))
    }

    async fn delete(&self, _key: &LookupKey) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("cache offline".into()))
    }
}

/// A router plus handles on its store and cache.
pub struct TestApp {
    pub store: Arc<CountingStore>,
    pub cache: Arc<dyn CacheStore>,
    pub state: AppState,
    pub admission: Arc<AdmissionController>,
    pub router: Router,
}

impl TestApp {
    /// Default policy, in-memory cache, a bucket large enough to never reject.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TestAppBuilder {
        TestAppBuilder::default()
    }

    pub fn client(&self) -> TestClient {
        TestClient::new(self.router.clone())
    }

    pub async fn seed(&self, phone: &str, status: UserStatus) -> User {
        self.store
            .insert(NewUser::new(
                PhoneNumber::parse(phone).unwrap(),
                status,
                "2030-12-31",
            ))
            .await
            .unwrap()
    }
}

pub struct TestAppBuilder {
    store: CountingStore,
    cache: Option<Arc<dyn CacheStore>>,
    policy: CachePolicy,
    bucket: (u32, f64),
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self {
            store: CountingStore::new(),
            cache: None,
            policy: CachePolicy::default(),
            bucket: (1_000_000, 1_000_000.0),
        }
    }
}

impl TestAppBuilder {
    pub fn store(mut self, store: CountingStore) -> Self {
        self.store = store;
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn bucket(mut self, capacity: u32, refill_per_sec: f64) -> Self {
        self.bucket = (capacity, refill_per_sec);
        self
    }

    pub fn build(self) -> TestApp {
        let store = Arc::new(self.store);
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MokaCacheStore::new(MokaCacheConfig::default())));
        let state = AppState::new(store.clone(), cache.clone(), self.policy);
        let admission =
            Arc::new(AdmissionController::new(self.bucket.0, self.bucket.1).unwrap());
        // Recorder local, sin instalar como global.
        let prometheus = PrometheusBuilder::new().build_recorder().handle();

        let router = create_router_with_state(state.clone(), admission.clone(), prometheus);

        TestApp {
            store,
            cache,
            state,
            admission,
            router,
        }
    }
}

pub fn phone_body(phone: &str) -> Value {
    json!({ "phoneNumber": phone })
}

pub fn user_body(phone: &str, status: i32, valid_time: &str) -> Value {
    json!({ "phoneNumber": phone, "status": status, "validTime": valid_time })
}
