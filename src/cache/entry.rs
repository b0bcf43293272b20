//! Cache entries and their JSON snapshot format
//!
//! A snapshot is a JSON object mapping each URL to `{"data": ..., "error": ...}`.
//! Errors travel as `{"message": "..."}` so they survive the trip to another
//! process intact.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while reading or writing cache snapshots
#[derive(Debug, Error)]
pub enum CacheError {
    /// The snapshot string is not valid snapshot JSON
    #[error("Failed to parse cache snapshot: {0}")]
    Parse(#[from] serde_json::Error),

    /// A snapshot entry carries both data and an error
    #[error("Snapshot entry for '{0}' has both data and error set")]
    ConflictingEntry(String),

    /// Cached data could not be serialized
    #[error("Failed to serialize cache snapshot: {0}")]
    Serialize(String),
}

/// Serializable description of a failed fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Human-readable failure message
    pub message: String,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A resolved fetch result for one URL
///
/// Exactly one of `data` and `error` is set. Use [`CacheEntry::success`] and
/// [`CacheEntry::failure`] to build entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry<T> {
    /// Records returned by a successful fetch
    pub data: Option<Vec<T>>,
    /// Captured failure of an unsuccessful fetch
    pub error: Option<ErrorInfo>,
}

impl<T> CacheEntry<T> {
    pub fn success(data: Vec<T>) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: ErrorInfo) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.data.is_some()
    }
}

/// Entry as it appears on the wire, before validation
#[derive(Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct WireEntry<T> {
    #[serde(default)]
    data: Option<Vec<T>>,
    #[serde(default)]
    error: Option<ErrorInfo>,
}

/// Borrowed view used when writing a snapshot
#[derive(Serialize)]
struct WireEntryRef<'a, T> {
    data: Option<&'a Vec<T>>,
    error: Option<&'a ErrorInfo>,
}

/// Parses a snapshot string into resolved entries.
///
/// Entries with neither data nor error were never attempted and are skipped.
pub fn parse_snapshot<T>(snapshot: &str) -> Result<HashMap<String, CacheEntry<T>>, CacheError>
where
    T: DeserializeOwned,
{
    let wire: HashMap<String, WireEntry<T>> = serde_json::from_str(snapshot)?;

    let mut entries = HashMap::with_capacity(wire.len());
    for (url, entry) in wire {
        match (entry.data, entry.error) {
            (Some(data), None) => {
                entries.insert(url, CacheEntry::success(data));
            }
            (None, Some(error)) => {
                entries.insert(url, CacheEntry::failure(error));
            }
            (None, None) => {}
            (Some(_), Some(_)) => return Err(CacheError::ConflictingEntry(url)),
        }
    }

    Ok(entries)
}

/// Writes entries as a snapshot string with keys in sorted order.
pub fn write_snapshot<'a, T, I>(entries: I) -> Result<String, CacheError>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = (&'a String, &'a CacheEntry<T>)>,
{
    let sorted: BTreeMap<&String, WireEntryRef<'_, T>> = entries
        .into_iter()
        .map(|(url, entry)| {
            (
                url,
                WireEntryRef {
                    data: entry.data.as_ref(),
                    error: entry.error.as_ref(),
                },
            )
        })
        .collect();

    serde_json::to_string(&sorted).map_err(|e| CacheError::Serialize(e.to_string()))
}

/// What a reactive read of the cache currently shows for a URL
#[derive(Debug, Clone, PartialEq)]
pub struct Resource<T> {
    pub data: Option<Vec<T>>,
    pub is_loading: bool,
    pub error: Option<ErrorInfo>,
}

impl<T> Resource<T> {
    pub fn loading() -> Self {
        Self {
            data: None,
            is_loading: true,
            error: None,
        }
    }
}

impl<T> From<CacheEntry<T>> for Resource<T> {
    fn from(entry: CacheEntry<T>) -> Self {
        Self {
            data: entry.data,
            is_loading: false,
            error: entry.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_parse_snapshot_reads_success_and_failure() {
        let snapshot = r#"{
            "/a": {"data": [1, 2, 3], "error": null},
            "/b": {"data": null, "error": {"message": "boom"}}
        }"#;

        let entries: HashMap<String, CacheEntry<u32>> = parse_snapshot(snapshot).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries["/a"], CacheEntry::success(vec![1, 2, 3]));
        assert_eq!(entries["/b"], CacheEntry::failure(ErrorInfo::new("boom")));
    }

    #[test]
    fn test_parse_snapshot_skips_unattempted_entries() {
        let snapshot = r#"{"/a": {"data": null, "error": null}, "/b": {}}"#;

        let entries: HashMap<String, CacheEntry<u32>> = parse_snapshot(snapshot).unwrap();

        assert!(entries.is_empty());
    }

    #[test]
    fn test_parse_snapshot_rejects_conflicting_entry() {
        let snapshot = r#"{"/a": {"data": [1], "error": {"message": "x"}}}"#;

        let result = parse_snapshot::<u32>(snapshot);

        assert!(matches!(result, Err(CacheError::ConflictingEntry(url)) if url == "/a"));
    }

    #[test]
    fn test_parse_snapshot_rejects_malformed_json() {
        let result = parse_snapshot::<u32>("{not json");
        let err = result.unwrap_err();
        assert!(matches!(err, CacheError::Parse(_)));
        assert!(err.to_string().contains("Failed to parse cache snapshot"));
    }

    #[test]
    fn test_parse_snapshot_rejects_wrong_record_shape() {
        let result = parse_snapshot::<u32>(r#"{"/a": {"data": ["text"], "error": null}}"#);
        assert!(matches!(result, Err(CacheError::Parse(_))));
    }

    #[test]
    fn test_write_snapshot_sorts_keys_and_uses_wire_shape() {
        let mut entries = HashMap::new();
        entries.insert("/z".to_string(), CacheEntry::success(vec![7u32]));
        entries.insert(
            "/a".to_string(),
            CacheEntry::failure(ErrorInfo::new("not found")),
        );

        let snapshot = write_snapshot(&entries).unwrap();

        assert_eq!(
            snapshot,
            r#"{"/a":{"data":null,"error":{"message":"not found"}},"/z":{"data":[7],"error":null}}"#
        );
    }

    #[test]
    fn test_write_snapshot_empty() {
        let entries: HashMap<String, CacheEntry<Value>> = HashMap::new();
        assert_eq!(write_snapshot(&entries).unwrap(), "{}");
    }

    #[test]
    fn test_resource_from_entry_is_not_loading() {
        let resource: Resource<Value> = CacheEntry::success(vec![json!({"k": 1})]).into();
        assert!(!resource.is_loading);
        assert_eq!(resource.data, Some(vec![json!({"k": 1})]));
        assert!(resource.error.is_none());
    }

    #[test]
    fn test_error_info_display_is_message() {
        assert_eq!(ErrorInfo::new("timed out").to_string(), "timed out");
    }
}
