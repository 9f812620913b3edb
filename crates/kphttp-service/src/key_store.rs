//! Client keys persisted as `{ "<id>": "<base64 key>" }`.

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use kphttp_core::crypto::KEY_SIZE;
use kphttp_core::store::KeyStore;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::PathBuf;
use zeroize::Zeroizing;

use crate::config::AssociationPolicy;
use crate::persist::write_json_atomic;

pub struct FileKeyStore {
    path: PathBuf,
    policy: AssociationPolicy,
    keys: RwLock<BTreeMap<String, String>>,
}

impl FileKeyStore {
    pub fn open(path: impl Into<PathBuf>, policy: AssociationPolicy) -> Result<Self> {
        let path = path.into();
        let keys = if path.exists() {
            let raw = std::fs::read(&path)
                .with_context(|| format!("read key store {}", path.display()))?;
            serde_json::from_slice(&raw)
                .with_context(|| format!("parse key store {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            policy,
            keys: RwLock::new(keys),
        })
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

#[async_trait::async_trait]
impl KeyStore for FileKeyStore {
    async fn retrieve(&self, id: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let keys = self.keys.read();
        let Some(encoded) = keys.get(id) else {
            return Ok(None);
        };
        let key = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| anyhow!("stored key for {id} is corrupt: {e}"))?;
        Ok(Some(Zeroizing::new(key)))
    }

    async fn associate(&self, key: &[u8]) -> Result<String> {
        if self.policy == AssociationPolicy::Reject {
            bail!("association disabled by policy");
        }
        if key.len() != KEY_SIZE {
            bail!("key must be {KEY_SIZE} bytes, got {}", key.len());
        }
        let id = format!("kphttp-{}", uuid::Uuid::new_v4().simple());
        let mut keys = self.keys.write();
        keys.insert(id.clone(), general_purpose::STANDARD.encode(key));
        if let Err(e) = write_json_atomic(&self.path, &*keys) {
            keys.remove(&id);
            return Err(e);
        }
        Ok(id)
    }
}
