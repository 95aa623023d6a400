//! Per-user text documents stored under `home/<identityId>/`

use rand::seq::SliceRandom;
use uuid::Uuid;
use crate::Result;
use crate::auth::Session;
use crate::config::Config;
use crate::error::Error;
use crate::storage::{text_objects, StorageObjectRef};

const SAMPLE_SENTENCES: &[&str] = &[
    "Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod tempor incididunt ut labore et dolore magna aliqua.",
    "Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris nisi ut aliquip ex ea commodo consequat.",
    "Duis aute irure dolor in reprehenderit in voluptate velit esse cillum dolore eu fugiat nulla pariatur.",
    "Excepteur sint occaecat cupidatat non proident, sunt in culpa qui officia deserunt mollit anim id est laborum.",
];

/// A text document and the key it lives at.
#[derive(Debug, Clone)]
pub struct TextContent {
    pub key: String,
    pub text: String,
}

impl TextContent {
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }

    /// UTF-8 body as stored
    pub fn data(&self) -> Vec<u8> {
        self.text.as_bytes().to_vec()
    }
}

impl PartialEq for TextContent {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for TextContent {}

/// Text document operations on top of a session's storage client.
#[derive(Debug, Clone)]
pub struct TextLibrary {
    extension: String,
}

impl TextLibrary {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.content_extension.clone())
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Text objects in the user's home prefix. Invalid listing entries are dropped.
    pub async fn list(&self, session: &Session) -> Result<Vec<StorageObjectRef>> {
        let client = session.storage_client().await?;
        let prefix = session.home_prefix();
        let summaries = client.list(&prefix).await?;
        let objects = text_objects(&summaries, &self.extension);
        tracing::debug!(prefix = %prefix, listed = summaries.len(), kept = objects.len(), "Listed text contents");
        Ok(objects)
    }

    /// Write `text` to a new key and return the stored object.
    pub async fn create(&self, session: &Session, text: &str) -> Result<StorageObjectRef> {
        let key = format!(
            "{}{}.{}",
            session.home_prefix(),
            Uuid::new_v4().to_string().to_uppercase(),
            self.extension
        );
        self.save(session, &TextContent::new(key.clone(), text)).await?;

        let client = session.storage_client().await?;
        let summaries = client.list(&key).await?;
        text_objects(&summaries, &self.extension)
            .into_iter()
            .find(|object| object.key == key)
            .ok_or_else(|| Error::storage(format!("created content cannot be found: {}", key)))
    }

    /// Create a document holding one random placeholder sentence.
    pub async fn create_sample(&self, session: &Session) -> Result<StorageObjectRef> {
        let text = SAMPLE_SENTENCES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or_default();
        self.create(session, text).await
    }

    pub async fn save(&self, session: &Session, content: &TextContent) -> Result<()> {
        let client = session.storage_client().await?;
        client.put(&content.key, content.data()).await?;
        tracing::info!(key = %content.key, bytes = content.text.len(), "Saved text content");
        Ok(())
    }

    /// Load a document. Invalid UTF-8 is replaced rather than rejected.
    pub async fn load(&self, session: &Session, key: &str) -> Result<TextContent> {
        let client = session.storage_client().await?;
        let body = client.get(key).await?;
        Ok(TextContent::new(key, String::from_utf8_lossy(&body)))
    }

    pub async fn delete(&self, session: &Session, key: &str) -> Result<()> {
        let client = session.storage_client().await?;
        client.delete(key).await?;
        tracing::info!(key = %key, "Deleted object");
        Ok(())
    }

    /// Read any key the session's credentials can reach.
    ///
    /// `None` when the body is not UTF-8. Storage errors carry the provider's
    /// error code, so a denied read outside the home prefix shows up as
    /// `AccessDenied`.
    pub async fn fetch_text(&self, session: &Session, key: &str) -> Result<Option<String>> {
        let client = session.storage_client().await?;
        let body = client.get(key).await?;
        Ok(String::from_utf8(body).ok())
    }
}
