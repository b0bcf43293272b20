//! hydrate-cache library
//!
//! A fetch cache keyed by URL. The server preloads URLs and serializes the
//! cache into the page; the client initializes from that snapshot and reads
//! through the same cache without repeating the requests.

pub mod cache;
pub mod cli;
pub mod data;
pub mod transport;

pub use cache::{CacheEntry, ErrorInfo, FetchCache, Resource};
pub use transport::{HttpTransport, Transport, TransportConfig};
