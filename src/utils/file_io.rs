use std::fs::create_dir_all;
use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;

use tracing::debug;
use tracing::error;

use crate::ConfigEntry;
use crate::ConfigObject;
use crate::Result;

pub fn create_parent_dir_if_not_exist(path: &Path) -> Result<()> {
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            if let Err(e) = create_dir_all(parent_dir) {
                error!("Failed to create directory {:?}: {:?}", parent_dir, e);
                return Err(e.into());
            }
        }
    }
    Ok(())
}

pub fn open_file_for_append(path: &Path) -> Result<File> {
    create_parent_dir_if_not_exist(path)?;
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    Ok(file)
}

/// Read a JSON array of `{ "id": "ns/name", "config": ... }` entries
pub async fn read_seed_file<C: ConfigObject>(path: &Path) -> Result<Vec<ConfigEntry<C>>> {
    let bytes = tokio::fs::read(path).await?;
    let entries: Vec<ConfigEntry<C>> = serde_json::from_slice(&bytes)?;
    debug!(?path, count = entries.len(), "seed file loaded");
    Ok(entries)
}
