//! Asset resolver and copier.
//!
//! The resolver walks a directory tree into a sorted list of
//! [`AssetEntry`]s. The copier turns one or more of those lists into a copy
//! plan keyed by destination and executes it on the rayon pool.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::config::{absolutize, CopyPattern};
use crate::debug;
use crate::error::{BuildError, IoContext, Result};

/// A file discovered under an asset root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AssetEntry {
    /// Path relative to the asset root; never contains `..`.
    pub relative_path: PathBuf,
    /// Absolute path of the file to copy.
    pub source_path: PathBuf,
}

/// Enumerate every regular file under `root`, sorted by relative path.
///
/// A missing root yields an empty list. A root that is itself a file yields
/// that one file. Symbolic links are followed; a link leading back to a
/// directory already on the current descent is reported as a cycle.
pub fn resolve_assets(root: &Path) -> Result<Vec<AssetEntry>> {
    let meta = match fs::metadata(root) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(BuildError::io(root, e)),
    };

    let mut entries = Vec::new();
    if meta.is_file() {
        if let Some(name) = root.file_name() {
            entries.push(AssetEntry {
                relative_path: PathBuf::from(name),
                source_path: root.to_path_buf(),
            });
        }
        return Ok(entries);
    }

    let mut descent = vec![root.canonicalize().at(root)?];
    walk(root, root, &mut descent, &mut entries)?;
    entries.sort();
    Ok(entries)
}

fn walk(
    dir: &Path,
    base: &Path,
    descent: &mut Vec<PathBuf>,
    entries: &mut Vec<AssetEntry>,
) -> Result<()> {
    for entry in fs::read_dir(dir).at(dir)? {
        let path = entry.at(dir)?.path();
        // `fs::metadata` follows links; a dangling one fails here.
        let meta = fs::metadata(&path).at(&path)?;

        if meta.is_dir() {
            let canonical = path.canonicalize().at(&path)?;
            if descent.contains(&canonical) {
                return Err(BuildError::cyclic_link(&path));
            }
            descent.push(canonical);
            walk(&path, base, descent, entries)?;
            descent.pop();
        } else if meta.is_file() {
            let relative_path = path
                .strip_prefix(base)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| PathBuf::from(entry_name(&path)));
            entries.push(AssetEntry {
                relative_path,
                source_path: path,
            });
        }
    }
    Ok(())
}

fn entry_name(path: &Path) -> &std::ffi::OsStr {
    path.file_name().unwrap_or(path.as_os_str())
}

/// Copy every file under `source_dir` to `output_dir/dest_subpath/<relative>`.
///
/// Returns the written paths in sorted order. A missing `source_dir` is a
/// no-op.
pub fn copy_assets(source_dir: &Path, output_dir: &Path, dest_subpath: &Path) -> Result<Vec<PathBuf>> {
    copy_asset_sets(
        &[CopyPattern {
            from: source_dir.to_path_buf(),
            to: dest_subpath.to_path_buf(),
        }],
        output_dir,
    )
}

/// Resolve and copy several asset sets into `output_dir`.
///
/// When more than one source maps to a destination, the lexicographically
/// last source path wins. The plan is fixed before any copy starts, so the
/// parallel copy has the same result as copying sequentially in sorted order.
pub fn copy_asset_sets(sets: &[CopyPattern], output_dir: &Path) -> Result<Vec<PathBuf>> {
    let plan = plan_copies(sets, output_dir)?;
    if plan.is_empty() {
        return Ok(Vec::new());
    }

    let parents: BTreeSet<&Path> = plan.keys().filter_map(|dest| dest.parent()).collect();
    for parent in parents {
        fs::create_dir_all(parent).at(parent)?;
    }

    plan.par_iter().try_for_each(|(dest, source)| {
        debug!("copy"; "{} -> {}", source.display(), dest.display());
        fs::copy(source, dest)
            .map(|_| ())
            .map_err(|e| BuildError::copy(source, dest, e))
    })?;

    Ok(plan.into_keys().collect())
}

/// Destination → source, with conflicts already settled.
fn plan_copies(sets: &[CopyPattern], output_dir: &Path) -> Result<BTreeMap<PathBuf, PathBuf>> {
    let mut pairs = Vec::new();
    for set in sets {
        let dest_root = absolutize(output_dir, &set.to);
        for entry in resolve_assets(&set.from)? {
            pairs.push((dest_root.join(&entry.relative_path), entry.source_path));
        }
    }
    pairs.sort();

    // Sorted insertion makes the last source for a destination the survivor.
    let mut plan = BTreeMap::new();
    for (dest, source) in pairs {
        plan.insert(dest, source);
    }
    Ok(plan)
}
