//! Object storage capability
//!
//! The core only needs four operations from the store. [`S3Store`] speaks to
//! S3 with federated credentials; [`MemoryStore`] keeps objects in memory.

mod memory;
mod s3;
mod sigv4;

pub use memory::{MemoryConnector, MemoryStore};
pub use s3::{S3Connector, S3Store};
pub use sigv4::SigningCredentials;

use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::Result;
use crate::auth::FederatedCredentials;

/// Quote characters stripped from entity tags before hex decoding
const QUOTE_CHARACTERS: &[char] = &['"', '\'', '`'];

/// One entry of a listing as the store reports it. Stores may omit fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Storage operations used by the text library.
///
/// `list` returns the direct children of `prefix` (`/` is the delimiter).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Builds a storage client from a set of federated credentials.
///
/// The returned client is immutable and may be shared for the remainder of
/// the credentials' validity window.
#[async_trait]
pub trait StorageConnector: Send + Sync {
    async fn connect(&self, credentials: &FederatedCredentials) -> Result<Arc<dyn ObjectStore>>;
}

/// A text object in a listing, validated.
#[derive(Debug, Clone)]
pub struct StorageObjectRef {
    pub key: String,
    /// Entity tag decoded from hex (the MD5 of single-part uploads)
    pub hash: Vec<u8>,
    pub last_modified: DateTime<Utc>,
}

impl StorageObjectRef {
    /// Validate a listing entry.
    ///
    /// `None` unless the key carries `extension` and the etag and
    /// modification time are present and well-formed.
    pub fn from_summary(summary: &ObjectSummary, extension: &str) -> Option<Self> {
        let key = summary.key.as_deref()?;
        if path_extension(key) != Some(extension) {
            return None;
        }
        let etag = summary.etag.as_deref()?;
        let hash = hex::decode(etag.trim_matches(QUOTE_CHARACTERS)).ok()?;
        let last_modified = summary.last_modified?;

        Some(Self {
            key: key.to_string(),
            hash,
            last_modified,
        })
    }

    /// Last path component of the key
    pub fn filename(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl PartialEq for StorageObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for StorageObjectRef {}

impl std::hash::Hash for StorageObjectRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Extension of the last path component, without the dot.
fn path_extension(key: &str) -> Option<&str> {
    let name = key.rsplit('/').next()?;
    match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => Some(extension),
        _ => None,
    }
}

/// Keep the listing entries that validate as text objects.
pub fn text_objects(summaries: &[ObjectSummary], extension: &str) -> Vec<StorageObjectRef> {
    summaries
        .iter()
        .filter_map(|summary| StorageObjectRef::from_summary(summary, extension))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn summary(key: &str, etag: &str) -> ObjectSummary {
        ObjectSummary {
            key: Some(key.to_string()),
            etag: Some(etag.to_string()),
            last_modified: Some(Utc.with_ymd_and_hms(2024, 7, 7, 0, 0, 0).unwrap()),
        }
    }

    #[test]
    fn test_from_summary_strips_quotes_and_decodes_hex() {
        let object = StorageObjectRef::from_summary(
            &summary("home/id/note.txt", "\"9e107d9d372bb6826bd81d3542a419d6\""),
            "txt",
        )
        .unwrap();

        assert_eq!(object.filename(), "note.txt");
        assert_eq!(object.hash.len(), 16);
        assert_eq!(object.hash[0], 0x9e);
    }

    #[test]
    fn test_from_summary_drops_invalid_entries() {
        let good = summary("home/id/note.txt", "'00ff'");
        assert!(StorageObjectRef::from_summary(&good, "txt").is_some());

        let wrong_extension = summary("home/id/photo.png", "00ff");
        let no_extension = summary("home/id/README", "00ff");
        let dotfile = summary("home/id/.txt", "00ff");
        let bad_etag = summary("home/id/note.txt", "\"not-hex\"");
        let multipart = summary("home/id/note.txt", "\"00ff-2\"");
        let no_date = ObjectSummary { last_modified: None, ..good.clone() };
        let no_key = ObjectSummary { key: None, ..good.clone() };
        let no_etag = ObjectSummary { etag: None, ..good.clone() };

        for entry in [wrong_extension, no_extension, dotfile, bad_etag, multipart, no_date, no_key, no_etag] {
            assert!(StorageObjectRef::from_summary(&entry, "txt").is_none(), "accepted {:?}", entry);
        }
    }

    #[test]
    fn test_text_objects_filters_listing() {
        let listing = vec![
            summary("home/id/a.txt", "00"),
            summary("home/id/b.bin", "00"),
            summary("home/id/c.txt", "zz"),
        ];
        let objects = text_objects(&listing, "txt");
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, "home/id/a.txt");
    }

    #[test]
    fn test_equality_by_key() {
        let a = StorageObjectRef::from_summary(&summary("k.txt", "00"), "txt").unwrap();
        let mut b = StorageObjectRef::from_summary(&summary("k.txt", "ff"), "txt").unwrap();
        b.last_modified = Utc::now();
        assert_eq!(a, b);
    }
}
