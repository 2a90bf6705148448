//! Optional on-disk cursor checkpoint.
//!
//! When a checkpoint path is configured the cursor is read from it at start
//! and rewritten after every cycle that moved it. Writes go to a sibling
//! temporary file which is then renamed over the checkpoint, so a crash never
//! leaves a half-written file behind.
//!
//! ```json
//! {"timestamp":"2024-01-01T00:00:02.000Z","ids":["b","c"]}
//! ```

use std::path::{Path, PathBuf};

use crate::cursor::Cursor;
use crate::error::{TailError, TailResult};

/// Read a checkpoint. A missing file is not an error.
pub async fn load(path: &Path) -> TailResult<Option<Cursor>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(TailError::Checkpoint(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };
    let cursor = serde_json::from_str(&content).map_err(|e| {
        TailError::Checkpoint(format!("failed to parse {}: {}", path.display(), e))
    })?;
    Ok(Some(cursor))
}

/// Atomically replace the checkpoint with `cursor`.
pub async fn save(path: &Path, cursor: &Cursor) -> TailResult<()> {
    let json = serde_json::to_vec(cursor)
        .map_err(|e| TailError::Checkpoint(format!("failed to encode cursor: {}", e)))?;
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, &json).await.map_err(|e| {
        TailError::Checkpoint(format!("failed to write {}: {}", tmp.display(), e))
    })?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        TailError::Checkpoint(format!("failed to replace {}: {}", path.display(), e))
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
