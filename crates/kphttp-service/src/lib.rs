//! Stand-alone host for the KeePassHttp engine: file-backed key store and
//! credential database, a charset password generator and JSON configuration.

pub mod config;
pub mod database;
pub mod generator;
pub mod key_store;
pub mod paths;
mod persist;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use kphttp_core::KeePassHttpProtocol;

use crate::config::ServiceConfig;
use crate::database::JsonDatabase;
use crate::generator::CharsetGenerator;
use crate::key_store::FileKeyStore;

/// Open the stores under `data_dir` and wire them into a protocol engine.
pub fn build_protocol(config: &ServiceConfig, data_dir: &Path) -> Result<KeePassHttpProtocol> {
    std::fs::create_dir_all(data_dir)?;
    let keys = FileKeyStore::open(paths::keys_path(data_dir), config.association)?;
    let database = JsonDatabase::open(paths::entries_path(data_dir))?;
    let generator = CharsetGenerator::new(&config.generator)?;
    Ok(KeePassHttpProtocol::new(
        Arc::new(keys),
        Arc::new(generator),
        Arc::new(database),
    ))
}
