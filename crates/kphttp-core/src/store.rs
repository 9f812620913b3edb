//! Contracts of the collaborators the protocol engine consults. The engine
//! owns none of their state and expects each to be safe to call concurrently.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// One stored credential as reported by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginEntry {
    pub name: String,
    pub login: String,
    pub password: String,
    pub uuid: String,
    /// Auxiliary fields in store order. Keys are unique.
    #[serde(default)]
    pub string_fields: Vec<StringField>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringField {
    pub key: String,
    pub value: String,
}

impl StringField {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Lookup filter. Absent fields do not narrow the result; an all-empty query
/// returns every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub url: Option<String>,
    pub submit_url: Option<String>,
    pub realm: Option<String>,
}

impl SearchQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.submit_url.is_none() && self.realm.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogin {
    pub url: String,
    pub login: String,
    pub password: String,
    pub submit_url: Option<String>,
    pub realm: Option<String>,
}

#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Opaque string identifying the current contents of the store.
    async fn fingerprint(&self) -> Result<String>;
    async fn search(&self, query: &SearchQuery) -> Result<Vec<LoginEntry>>;
    async fn create(&self, login: NewLogin) -> Result<()>;
    async fn update(&self, uuid: &str, login: &str, password: &str) -> Result<()>;
}

#[async_trait::async_trait]
pub trait KeyStore: Send + Sync {
    async fn retrieve(&self, id: &str) -> Result<Option<Zeroizing<Vec<u8>>>>;
    /// Persist a newly presented key and return the id the client must use
    /// from now on. An error means the association was refused.
    async fn associate(&self, key: &[u8]) -> Result<String>;
}

#[async_trait::async_trait]
pub trait PasswordGenerator: Send + Sync {
    async fn generate(&self) -> Result<String>;
    async fn estimate_quality_bits(&self, password: &str) -> Result<u32>;
}
