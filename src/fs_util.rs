//! Atomic file replacement.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{BentoError, Result};

/// Sibling temp path in the same directory, so the final rename never
/// crosses a file system boundary.
fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()))
}

/// A symlinked target is replaced at the end of the link, so the link itself
/// survives. Dangling links are replaced in place.
pub(crate) fn resolve_target(path: &Path) -> PathBuf {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

/// Write `contents` to `path` via temp file + fsync + rename.
///
/// Observers see either the previous file or the complete new one. The temp
/// file is removed when any step fails.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let resolved = resolve_target(path);
    let path = resolved.as_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| BentoError::sync_io(parent, e))?;
    }

    let tmp_path = temp_path_for(path);
    let written = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);

        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(&tmp_path, meta.permissions())?;
        }
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(BentoError::sync_io(path, e));
    }
    Ok(())
}
