//! A small JSON-file credential database.
//!
//! Entries are kept in memory behind a lock and rewritten to disk on every
//! change. Lookups match on the host part of the entry URL, so
//! `https://example.com/login` and `http://EXAMPLE.com:8080/` find the same
//! entry.

use anyhow::{bail, Context, Result};
use kphttp_core::store::{CredentialStore, LoginEntry, NewLogin, SearchQuery, StringField};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::debug;

use crate::persist::write_json_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub uuid: String,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub string_fields: Vec<StringField>,
}

impl StoredEntry {
    fn to_login(&self) -> LoginEntry {
        LoginEntry {
            name: self.title.clone(),
            login: self.login.clone(),
            password: self.password.clone(),
            uuid: self.uuid.clone(),
            string_fields: self.string_fields.clone(),
        }
    }

    fn matches(&self, query: &SearchQuery) -> bool {
        if let Some(target) = query.url.as_deref().or(query.submit_url.as_deref()) {
            let wanted = host_of(target);
            let own = host_of(&self.url) == wanted;
            let submit = self
                .submit_url
                .as_deref()
                .map(|u| host_of(u) == wanted)
                .unwrap_or(false);
            if !own && !submit {
                return false;
            }
        }
        match (&query.realm, &self.realm) {
            (Some(wanted), Some(realm)) => wanted == realm,
            _ => true,
        }
    }
}

pub struct JsonDatabase {
    path: Option<PathBuf>,
    entries: RwLock<Vec<StoredEntry>>,
}

impl JsonDatabase {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = std::fs::read(&path)
                .with_context(|| format!("read database {}", path.display()))?;
            serde_json::from_slice(&raw)
                .with_context(|| format!("parse database {}", path.display()))?
        } else {
            Vec::new()
        };
        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
        })
    }

    /// A database that is never written to disk.
    pub fn in_memory(entries: Vec<StoredEntry>) -> Self {
        Self {
            path: None,
            entries: RwLock::new(entries),
        }
    }

    pub fn entries(&self) -> Vec<StoredEntry> {
        self.entries.read().clone()
    }

    fn persist(&self, entries: &[StoredEntry]) -> Result<()> {
        match &self.path {
            Some(path) => write_json_atomic(path, entries),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl CredentialStore for JsonDatabase {
    async fn fingerprint(&self) -> Result<String> {
        let entries = self.entries.read();
        let bytes = serde_json::to_vec(&*entries)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<LoginEntry>> {
        let entries = self.entries.read();
        let found: Vec<LoginEntry> = entries
            .iter()
            .filter(|e| e.matches(query))
            .map(StoredEntry::to_login)
            .collect();
        debug!(matches = found.len(), "credential search");
        Ok(found)
    }

    async fn create(&self, login: NewLogin) -> Result<()> {
        let mut entries = self.entries.write();
        let title = match host_of(&login.url) {
            host if host.is_empty() => login.url.clone(),
            host => host,
        };
        entries.push(StoredEntry {
            uuid: uuid::Uuid::new_v4().simple().to_string(),
            title,
            url: login.url,
            submit_url: login.submit_url,
            realm: login.realm,
            login: login.login,
            password: login.password,
            string_fields: Vec::new(),
        });
        if let Err(e) = self.persist(&entries) {
            entries.pop();
            return Err(e);
        }
        Ok(())
    }

    async fn update(&self, uuid: &str, login: &str, password: &str) -> Result<()> {
        let mut entries = self.entries.write();
        let Some(index) = entries.iter().position(|e| e.uuid == uuid) else {
            bail!("no entry with uuid {uuid}");
        };
        let previous = entries[index].clone();
        entries[index].login = login.to_string();
        entries[index].password = password.to_string();
        if let Err(e) = self.persist(&entries) {
            entries[index] = previous;
            return Err(e);
        }
        Ok(())
    }
}

/// Lower-cased host of `url`, without scheme, credentials, port or path.
/// Inputs without a scheme are treated as a bare host.
pub fn host_of(url: &str) -> String {
    let rest = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    let authority = rest
        .split(|c: char| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();
    let host = if let Some(bracketed) = host_port.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or_default()
    } else {
        host_port.split(':').next().unwrap_or_default()
    };
    host.trim().to_ascii_lowercase()
}
