//! Two-tier shortcut resolution.
//!
//! Lookup order for a candidate name:
//!
//! 1. the in-memory memo, valid for a short TTL, holding positive *and*
//!    negative results;
//! 2. the library snapshot in the local store, mirrored into the memo on hit;
//! 3. the remote resolver, whose outcome (including a miss or a transport
//!    failure) is written to the memo only.
//!
//! Lookups of the same name are serialised on a per-name gate and re-check the
//! memo once they hold it, so concurrent detections issue a single remote call.
//! Stale memo entries are swept on every lookup; there is no background timer.

use std::{
  collections::HashMap,
  sync::Arc,
  time::Duration,
};

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{
  debug,
  trace,
  warn,
};

use crate::{
  Tendril,
  content::ResolvedContent,
  remote::ShortcutResolver,
  store::{
    Store,
    keys,
  },
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CacheConfig {
  /// Lifetime of memo entries, positive and negative alike.
  pub ttl_ms: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self { ttl_ms: 5_000 }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_millis(self.ttl_ms)
  }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub key:       Tendril,
  pub result:    Option<ResolvedContent>,
  pub stored_at: Instant,
}

impl CacheEntry {
  fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
    now.saturating_duration_since(self.stored_at) < ttl
  }
}

/// Where a resolution was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
  Memo,
  Local,
  Remote,
}

type Gate = Arc<tokio::sync::Mutex<()>>;

pub struct ResolutionCache {
  ttl:      Duration,
  memo:     Mutex<HashMap<Tendril, CacheEntry>>,
  gates:    Mutex<HashMap<Tendril, Gate>>,
  store:    Arc<dyn Store>,
  resolver: Arc<dyn ShortcutResolver>,
}

impl ResolutionCache {
  pub fn new(config: &CacheConfig, store: Arc<dyn Store>, resolver: Arc<dyn ShortcutResolver>) -> Self {
    Self {
      ttl: config.ttl(),
      memo: Mutex::new(HashMap::new()),
      gates: Mutex::new(HashMap::new()),
      store,
      resolver,
    }
  }

  pub async fn resolve(&self, name: &str) -> Option<ResolvedContent> {
    self.resolve_with_tier(name).await.0
  }

  pub async fn resolve_with_tier(&self, name: &str) -> (Option<ResolvedContent>, Tier) {
    if let Some(hit) = self.memo_lookup(name) {
      trace!(name, hit = hit.is_some(), "memo hit");
      return (hit, Tier::Memo);
    }

    if let Some(content) = self.local_lookup(name) {
      trace!(name, "library hit");
      self.remember(name, Some(content.clone()));
      return (Some(content), Tier::Local);
    }

    let gate = self.gate(name);
    let _guard = gate.lock().await;
    // Another lookup may have finished while this one waited on the gate.
    if let Some(hit) = self.memo_lookup(name) {
      return (hit, Tier::Memo);
    }

    let result = if self.resolver.is_available() {
      match self.resolver.fetch_shortcut(name).await {
        Ok(result) => result,
        Err(err) => {
          warn!(name, "remote shortcut lookup failed: {err}");
          None
        },
      }
    } else {
      debug!(name, "resolver unavailable, treating as miss");
      None
    };
    self.remember(name, result.clone());
    (result, Tier::Remote)
  }

  /// Fresh memo entry for `name`, sweeping stale entries on the way.
  fn memo_lookup(&self, name: &str) -> Option<Option<ResolvedContent>> {
    let now = Instant::now();
    let mut memo = self.memo.lock();
    memo.retain(|_, entry| entry.is_fresh(now, self.ttl));
    self
      .gates
      .lock()
      .retain(|_, gate| Arc::strong_count(gate) > 1);
    memo.get(name).map(|entry| entry.result.clone())
  }

  fn local_lookup(&self, name: &str) -> Option<ResolvedContent> {
    let entry = self.store.get_field(keys::LIBRARY, name)?;
    match serde_json::from_value::<ResolvedContent>(entry) {
      Ok(mut content) => {
        if content.shortcut.is_empty() {
          content.shortcut = name.to_string();
        }
        Some(content)
      },
      Err(err) => {
        warn!(name, "malformed library entry: {err}");
        None
      },
    }
  }

  fn remember(&self, name: &str, result: Option<ResolvedContent>) {
    let key = Tendril::from(name);
    self.memo.lock().insert(key.clone(), CacheEntry {
      key,
      result,
      stored_at: Instant::now(),
    });
  }

  fn gate(&self, name: &str) -> Gate {
    self
      .gates
      .lock()
      .entry(Tendril::from(name))
      .or_default()
      .clone()
  }

  /// Drops the memo entry for `name`, e.g. after the shortcut was created.
  pub fn invalidate(&self, name: &str) {
    self.memo.lock().remove(name);
  }

  pub fn clear(&self) {
    self.memo.lock().clear();
  }

  /// Number of memo entries, stale ones included until the next sweep.
  pub fn len(&self) -> usize {
    self.memo.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{
    AtomicUsize,
    Ordering,
  };

  use async_trait::async_trait;
  use serde_json::json;

  use super::*;
  use crate::{
    remote::{
      self,
      TransportError,
    },
    store::{
      self,
      MemoryStore,
      StoreChange,
    },
  };

  #[derive(Default)]
  struct CountingResolver {
    calls:     AtomicUsize,
    known:     HashMap<String, ResolvedContent>,
    fail:      bool,
    available: bool,
  }

  impl CountingResolver {
    fn new() -> Self {
      Self {
        available: true,
        ..Default::default()
      }
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl ShortcutResolver for CountingResolver {
    fn is_available(&self) -> bool {
      self.available
    }

    async fn fetch_shortcut(&self, name: &str) -> remote::Result<Option<ResolvedContent>> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(50)).await;
      if self.fail {
        return Err(TransportError::TimedOut);
      }
      Ok(self.known.get(name).cloned())
    }
  }

  /// Counts whole-value reads of the library key.
  #[derive(Default)]
  struct WatchedStore {
    inner:         MemoryStore,
    library_reads: AtomicUsize,
  }

  impl Store for WatchedStore {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
      if key == keys::LIBRARY {
        self.library_reads.fetch_add(1, Ordering::SeqCst);
      }
      self.inner.get(key)
    }

    fn get_field(&self, key: &str, field: &str) -> Option<serde_json::Value> {
      self.inner.get_field(key, field)
    }

    fn set(&self, key: &str, value: serde_json::Value) -> store::Result<()> {
      self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> store::Result<()> {
      self.inner.remove(key)
    }

    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StoreChange> {
      self.inner.subscribe()
    }
  }

  #[tokio::test(start_paused = true)]
  async fn library_lookups_read_single_entries() {
    let store = Arc::new(WatchedStore::default());
    store
      .set(
        keys::LIBRARY,
        json!({ "/hi": { "body": "Hi there" }, "/bye": { "body": "Bye" } }),
      )
      .unwrap();
    let cache = ResolutionCache::new(
      &CacheConfig::default(),
      store.clone(),
      Arc::new(CountingResolver::new()),
    );

    for name in ["/hi", "/bye", "/nope", "hi", "i"] {
      cache.resolve(name).await;
    }
    assert_eq!(cache.resolve_with_tier("/bye").await.1, Tier::Memo);
    assert_eq!(store.library_reads.load(Ordering::SeqCst), 0);
  }

  fn cache_with(resolver: Arc<CountingResolver>, store: Arc<MemoryStore>) -> ResolutionCache {
    ResolutionCache::new(&CacheConfig::default(), store, resolver)
  }

  #[tokio::test(start_paused = true)]
  async fn negative_results_are_cached() {
    let resolver = Arc::new(CountingResolver::new());
    let cache = cache_with(resolver.clone(), Arc::new(MemoryStore::new()));

    assert_eq!(cache.resolve("/nope").await, None);
    assert_eq!(cache.resolve_with_tier("/nope").await, (None, Tier::Memo));
    assert_eq!(resolver.calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn stale_entries_are_refetched() {
    let resolver = Arc::new(CountingResolver::new());
    let cache = cache_with(resolver.clone(), Arc::new(MemoryStore::new()));

    cache.resolve("/nope").await;
    tokio::time::advance(CacheConfig::default().ttl()).await;
    cache.resolve("/nope").await;
    assert_eq!(resolver.calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn concurrent_lookups_share_one_remote_call() {
    let mut resolver = CountingResolver::new();
    resolver
      .known
      .insert("/sig".into(), ResolvedContent::plain("/sig", "Regards"));
    let resolver = Arc::new(resolver);
    let cache = cache_with(resolver.clone(), Arc::new(MemoryStore::new()));

    let (a, b, c) = tokio::join!(
      cache.resolve("/sig"),
      cache.resolve("/sig"),
      cache.resolve("/sig")
    );
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(a.unwrap().body, crate::content::ContentBody::Plain("Regards".into()));
    assert_eq!(resolver.calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn library_hits_skip_remote_and_fill_memo() {
    let resolver = Arc::new(CountingResolver::new());
    let store = Arc::new(MemoryStore::new());
    store
      .set(keys::LIBRARY, json!({ "/hi": { "body": "Hi there" } }))
      .unwrap();
    let cache = cache_with(resolver.clone(), store.clone());

    let (content, tier) = cache.resolve_with_tier("/hi").await;
    assert_eq!(tier, Tier::Local);
    assert_eq!(content, Some(ResolvedContent::plain("/hi", "Hi there")));

    // The memo answers even after the library entry disappears.
    store.remove(keys::LIBRARY).unwrap();
    assert_eq!(cache.resolve_with_tier("/hi").await.1, Tier::Memo);
    assert_eq!(resolver.calls(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn transport_failures_are_memoised_misses() {
    let resolver = Arc::new(CountingResolver {
      fail: true,
      ..CountingResolver::new()
    });
    let cache = cache_with(resolver.clone(), Arc::new(MemoryStore::new()));
    assert_eq!(cache.resolve("/x").await, None);
    assert_eq!(cache.resolve("/x").await, None);
    assert_eq!(resolver.calls(), 1);

    cache.invalidate("/x");
    cache.resolve("/x").await;
    assert_eq!(resolver.calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn unavailable_resolver_is_never_called() {
    let resolver = Arc::new(CountingResolver::default());
    let cache = cache_with(resolver.clone(), Arc::new(MemoryStore::new()));
    assert_eq!(cache.resolve("/x").await, None);
    assert_eq!(resolver.calls(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn sweep_drops_stale_entries() {
    let resolver = Arc::new(CountingResolver::new());
    let cache = cache_with(resolver.clone(), Arc::new(MemoryStore::new()));
    cache.resolve("/a").await;
    cache.resolve("/b").await;
    assert_eq!(cache.len(), 2);

    tokio::time::advance(CacheConfig::default().ttl()).await;
    cache.resolve("/c").await;
    assert_eq!(cache.len(), 1);
  }
}
