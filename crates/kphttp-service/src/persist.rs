use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Serialize `value` next to `path` and rename it into place so a crash
/// never leaves a half-written file behind.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)
        .with_context(|| format!("create directory {}", parent.display()))?;

    let mut staging = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create staging file in {}", parent.display()))?;
    serde_json::to_writer_pretty(&mut staging, value)?;
    staging.flush()?;
    staging.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(staging.path(), std::fs::Permissions::from_mode(0o600))?;
    }

    staging
        .persist(path)
        .map_err(|e| anyhow::anyhow!("replace {}: {e}", path.display()))?;
    Ok(())
}
