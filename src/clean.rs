//! Clean stage: removes the previous build's output directory.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{BuildError, IoContext, Result};

/// Remove `output_dir` and everything under it.
///
/// Absent directory is a no-op. A symlink at `output_dir` is unlinked rather
/// than followed, so nothing outside the directory is ever touched. A regular
/// file at that path is an error: it is not ours to delete.
pub fn clean(output_dir: &Path) -> Result<bool> {
    let meta = match fs::symlink_metadata(output_dir) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(BuildError::io(output_dir, e)),
    };

    if meta.file_type().is_symlink() {
        fs::remove_file(output_dir).at(output_dir)?;
        return Ok(true);
    }

    if !meta.is_dir() {
        return Err(BuildError::io(output_dir, io::Error::other("not a directory")));
    }

    fs::remove_dir_all(output_dir).at(output_dir)?;
    Ok(true)
}
