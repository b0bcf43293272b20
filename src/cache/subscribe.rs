//! Observer registry for entry resolution
//!
//! UI layers register a callback per URL and re-read the cache when it fires.

use std::collections::HashMap;
use std::sync::Arc;

/// Callback invoked with the URL whose entry resolved
pub type Callback = Arc<dyn Fn(&str) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callbacks grouped by URL
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    by_url: HashMap<String, Vec<(SubscriptionId, Callback)>>,
}

impl Subscribers {
    pub(crate) fn add(&mut self, url: &str, callback: Callback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.by_url
            .entry(url.to_string())
            .or_default()
            .push((id, callback));
        id
    }

    /// Removes a subscription; returns whether it existed
    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let mut removed = false;
        self.by_url.retain(|_, callbacks| {
            let before = callbacks.len();
            callbacks.retain(|(existing, _)| *existing != id);
            removed |= callbacks.len() != before;
            !callbacks.is_empty()
        });
        removed
    }

    /// Callbacks registered for `url`, cloned so they can run without the lock
    pub(crate) fn for_url(&self, url: &str) -> Vec<Callback> {
        self.by_url
            .get(url)
            .map(|callbacks| callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }
}
