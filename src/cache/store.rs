//! The URL-keyed fetch cache
//!
//! [`FetchCache`] is a cheap-to-clone handle to one shared store. Each URL is
//! fetched at most once: the first caller claims the URL by inserting a
//! pending slot that holds a shared future, and every later caller either
//! reads the resolved entry or awaits that same future.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{de::DeserializeOwned, Serialize};
use tokio::runtime::Handle;

use super::entry::{self, CacheEntry, CacheError, ErrorInfo, Resource};
use super::session::SessionStore;
use super::subscribe::{Callback, SubscriptionId, Subscribers};
use crate::transport::Transport;

/// Session key the snapshot is mirrored under by default
pub const DEFAULT_SESSION_KEY: &str = "cache";

/// Bounds every cached record type must meet
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Record for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

type SharedFetch<T> = Shared<BoxFuture<'static, CacheEntry<T>>>;

/// Settings for a [`FetchCache`]
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Key the snapshot is stored under in the session store
    pub session_key: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            session_key: DEFAULT_SESSION_KEY.to_string(),
        }
    }
}

enum Slot<T> {
    /// A fetch is in flight; `generation` identifies this particular claim
    Pending {
        generation: u64,
        fetch: SharedFetch<T>,
    },
    Resolved(CacheEntry<T>),
}

struct State<T> {
    slots: HashMap<String, Slot<T>>,
    next_generation: u64,
    /// Bumped by `reset`; session reads from an older epoch are not promoted
    epoch: u64,
    subscribers: Subscribers,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    transport: Arc<dyn Transport>,
    session: Option<Arc<dyn SessionStore>>,
    config: CacheConfig,
}

/// Outcome of looking a URL up in the cache
enum Lookup<T> {
    Ready(CacheEntry<T>),
    InFlight(SharedFetch<T>),
    /// This caller started the fetch and must make sure it is driven
    Claimed(SharedFetch<T>),
}

/// Builder for [`FetchCache`]
pub struct CacheBuilder<T> {
    transport: Arc<dyn Transport>,
    session: Option<Arc<dyn SessionStore>>,
    config: CacheConfig,
    record: PhantomData<fn() -> T>,
}

impl<T: Record> CacheBuilder<T> {
    /// Attaches a session store as the second cache tier
    pub fn session(mut self, session: Arc<dyn SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> FetchCache<T> {
        FetchCache {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    slots: HashMap::new(),
                    next_generation: 0,
                    epoch: 0,
                    subscribers: Subscribers::default(),
                }),
                transport: self.transport,
                session: self.session,
                config: self.config,
            }),
        }
    }
}

/// In-memory cache of fetch results keyed by URL
///
/// Construct one per process or request context and hand out clones; all
/// clones share the same entries.
pub struct FetchCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for FetchCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Record> FetchCache<T> {
    /// Creates a cache with default settings and no session store
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::builder(transport).build()
    }

    pub fn builder(transport: Arc<dyn Transport>) -> CacheBuilder<T> {
        CacheBuilder {
            transport,
            session: None,
            config: CacheConfig::default(),
            record: PhantomData,
        }
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Reactive read of `url`
    ///
    /// Returns resolved data or error immediately when the URL is cached.
    /// Otherwise starts the fetch in the background (at most once per URL)
    /// and returns a loading resource; subscribers of `url` are notified when
    /// the fetch resolves. Starting a fetch requires a Tokio runtime; without
    /// one, an uncached URL yields an error resource and nothing is stored.
    pub fn fetch_or_get(&self, url: &str) -> Resource<T> {
        let lookup = self.lookup(url);
        if let Some(Lookup::Ready(entry)) = lookup {
            return entry.into();
        }

        let Ok(runtime) = Handle::try_current() else {
            if lookup.is_some() {
                return Resource::loading();
            }
            tracing::warn!(url, "no Tokio runtime available, not fetching");
            return Resource {
                data: None,
                is_loading: false,
                error: Some(ErrorInfo::new(format!(
                    "No async runtime available to fetch {url}"
                ))),
            };
        };

        let fetch = match lookup.unwrap_or_else(|| self.claim(url)) {
            Lookup::Ready(entry) => return entry.into(),
            Lookup::InFlight(fetch) | Lookup::Claimed(fetch) => fetch,
        };
        // Also drives fetches whose claiming future was dropped before finishing.
        runtime.spawn(fetch);
        Resource::loading()
    }

    /// Returns the entry for `url`, fetching it if nobody has yet
    ///
    /// Concurrent callers for the same URL share one request.
    pub async fn resolve(&self, url: &str) -> CacheEntry<T> {
        let lookup = match self.lookup(url) {
            Some(lookup) => lookup,
            None => self.claim(url),
        };

        match lookup {
            Lookup::Ready(entry) => entry,
            Lookup::InFlight(fetch) => fetch.await,
            Lookup::Claimed(fetch) => {
                // Detached so the slot still resolves if this future is dropped.
                if let Ok(runtime) = Handle::try_current() {
                    runtime.spawn(fetch.clone());
                }
                fetch.await
            }
        }
    }

    /// Fetches and stores `url` unless it is already cached or in flight
    ///
    /// Failures are stored as error entries, never returned.
    pub async fn preload(&self, url: &str) {
        let entry = self.resolve(url).await;
        tracing::debug!(url, ok = entry.is_success(), "preloaded");
    }

    /// Snapshot of every resolved entry as a JSON string with sorted keys
    pub fn serialize(&self) -> Result<String, CacheError> {
        let state = self.state();
        entry::write_snapshot(state.slots.iter().filter_map(|(url, slot)| match slot {
            Slot::Resolved(entry) => Some((url, entry)),
            Slot::Pending { .. } => None,
        }))
    }

    /// Merges a snapshot into the cache
    ///
    /// Snapshot entries overwrite existing ones for the same URL; other
    /// entries are kept. When a session store is attached, the raw snapshot
    /// is also written to it. On a parse error the cache is left untouched.
    pub fn initialize(&self, snapshot: &str) -> Result<(), CacheError> {
        let entries = entry::parse_snapshot::<T>(snapshot)?;
        let count = entries.len();

        let mut notify = Vec::new();
        {
            let mut state = self.state();
            for (url, entry) in entries {
                let callbacks = state.subscribers.for_url(&url);
                if !callbacks.is_empty() {
                    notify.push((url.clone(), callbacks));
                }
                state.slots.insert(url, Slot::Resolved(entry));
            }
        }

        if let Some(session) = &self.inner.session {
            if let Err(e) = session.set(&self.inner.config.session_key, snapshot) {
                tracing::warn!(error = %e, "failed to mirror snapshot to session store");
            }
        }

        tracing::info!(entries = count, "cache initialized from snapshot");

        for (url, callbacks) in notify {
            run_callbacks(&url, &callbacks);
        }
        Ok(())
    }

    /// Removes every entry and the session mirror
    ///
    /// Fetches still in flight finish but are not stored.
    pub fn reset(&self) {
        // The mirror goes first so a session read that sees the old epoch
        // is always discarded.
        if let Some(session) = &self.inner.session {
            if let Err(e) = session.remove(&self.inner.config.session_key) {
                tracing::warn!(error = %e, "failed to clear session store");
            }
        }

        {
            let mut state = self.state();
            state.slots.clear();
            state.epoch += 1;
        }
        tracing::debug!("cache reset");
    }

    /// Registers `callback` to run whenever `url` resolves
    ///
    /// If `url` is already resolved, the callback runs once right away.
    pub fn subscribe<F>(&self, url: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let (id, resolved) = {
            let mut state = self.state();
            let id = state.subscribers.add(url, Arc::clone(&callback));
            let resolved = matches!(state.slots.get(url), Some(Slot::Resolved(_)));
            (id, resolved)
        };

        if resolved {
            callback(url);
        }
        id
    }

    /// Removes a subscription; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state().subscribers.remove(id)
    }

    /// The resolved entry for `url`, if any
    pub fn entry(&self, url: &str) -> Option<CacheEntry<T>> {
        match self.state().slots.get(url) {
            Some(Slot::Resolved(entry)) => Some(entry.clone()),
            _ => None,
        }
    }

    pub fn is_pending(&self, url: &str) -> bool {
        matches!(self.state().slots.get(url), Some(Slot::Pending { .. }))
    }

    /// URLs with resolved entries, sorted
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .state()
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Resolved(_)))
            .map(|(url, _)| url.clone())
            .collect();
        urls.sort();
        urls
    }

    /// Number of resolved entries
    pub fn len(&self) -> usize {
        self.state()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Resolved(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks `url` up in memory, then in the session store
    ///
    /// Returns `None` when neither tier knows the URL.
    fn lookup(&self, url: &str) -> Option<Lookup<T>> {
        let epoch = {
            let state = self.state();
            if let Some(found) = Self::existing(&state, url) {
                tracing::debug!(url, "cache hit");
                return Some(found);
            }
            state.epoch
        };

        let restored = self.read_session(url)?;

        // The memory tier wins if it was filled while the session was read.
        let callbacks = {
            let mut state = self.state();
            if let Some(found) = Self::existing(&state, url) {
                return Some(found);
            }
            if state.epoch != epoch {
                tracing::debug!(url, "cache reset during session read, not restoring");
                return None;
            }
            state
                .slots
                .insert(url.to_string(), Slot::Resolved(restored.clone()));
            state.subscribers.for_url(url)
        };

        tracing::debug!(url, "restored from session store");
        run_callbacks(url, &callbacks);
        Some(Lookup::Ready(restored))
    }

    fn existing(state: &State<T>, url: &str) -> Option<Lookup<T>> {
        match state.slots.get(url)? {
            Slot::Resolved(entry) => Some(Lookup::Ready(entry.clone())),
            Slot::Pending { fetch, .. } => Some(Lookup::InFlight(fetch.clone())),
        }
    }

    fn read_session(&self, url: &str) -> Option<CacheEntry<T>> {
        let session = self.inner.session.as_ref()?;

        let raw = match session.get(&self.inner.config.session_key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read session store");
                return None;
            }
        };

        match entry::parse_snapshot::<T>(&raw) {
            Ok(mut entries) => entries.remove(url),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable session snapshot");
                None
            }
        }
    }

    /// Claims `url` by inserting a pending slot, unless someone beat us to it
    fn claim(&self, url: &str) -> Lookup<T> {
        let mut state = self.state();
        if let Some(found) = Self::existing(&state, url) {
            return found;
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let fetch = self.fetch_task(url.to_string(), generation);
        state.slots.insert(
            url.to_string(),
            Slot::Pending {
                generation,
                fetch: fetch.clone(),
            },
        );

        tracing::debug!(url, generation, "fetch claimed");
        Lookup::Claimed(fetch)
    }

    fn fetch_task(&self, url: String, generation: u64) -> SharedFetch<T> {
        let transport = Arc::clone(&self.inner.transport);
        let cache = Arc::downgrade(&self.inner);

        async move {
            let entry = fetch_entry::<T>(transport.as_ref(), &url).await;
            complete(&cache, &url, generation, &entry);
            entry
        }
        .boxed()
        .shared()
    }
}

/// Stores a finished fetch if its claim is still current, then notifies
fn complete<T: Record>(cache: &Weak<Inner<T>>, url: &str, generation: u64, entry: &CacheEntry<T>) {
    let Some(inner) = cache.upgrade() else {
        return;
    };

    let callbacks = {
        let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        let current = matches!(
            state.slots.get(url),
            Some(Slot::Pending { generation: claimed, .. }) if *claimed == generation
        );
        if !current {
            tracing::debug!(url, generation, "discarding superseded fetch result");
            return;
        }

        state
            .slots
            .insert(url.to_string(), Slot::Resolved(entry.clone()));
        state.subscribers.for_url(url)
    };

    run_callbacks(url, &callbacks);
}

/// Fetches `url` and turns the outcome into an entry
async fn fetch_entry<T: Record>(transport: &dyn Transport, url: &str) -> CacheEntry<T> {
    let body = match transport.fetch(url).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(url, error = %e, "fetch failed");
            return CacheEntry::failure(ErrorInfo::new(e.to_string()));
        }
    };

    match serde_json::from_str::<Vec<T>>(&body) {
        Ok(data) => {
            tracing::info!(url, records = data.len(), "fetched");
            CacheEntry::success(data)
        }
        Err(e) => {
            tracing::warn!(url, error = %e, "response is not a valid record list");
            CacheEntry::failure(ErrorInfo::new(format!(
                "Failed to parse response from {url}: {e}"
            )))
        }
    }
}

fn run_callbacks(url: &str, callbacks: &[Callback]) {
    for callback in callbacks {
        callback(url);
    }
}
