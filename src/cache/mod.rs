//! URL-keyed fetch cache with snapshot hydration
//!
//! The in-memory [`FetchCache`] is the primary tier. An optional
//! [`SessionStore`] holds the last snapshot passed to `initialize`, so a
//! reloaded process can answer from it without fetching again.

mod entry;
mod session;
mod store;
mod subscribe;

pub use entry::{CacheEntry, CacheError, ErrorInfo, Resource};
pub use session::{FileSession, MemorySession, SessionError, SessionStore};
pub use store::{CacheBuilder, CacheConfig, FetchCache, Record, DEFAULT_SESSION_KEY};
pub use subscribe::{Callback, SubscriptionId};
