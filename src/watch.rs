//! Watch mode: rebuild when an input changes.
//!
//! Watched roots are the entry module's directory, the template's directory
//! and every asset source tree. Events under the output directory are ignored
//! so a build never triggers itself. A failed build is logged and watching
//! continues; the next change triggers a fresh pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};

use crate::config::BuildConfig;
use crate::error::{BuildError, Result};
use crate::pipeline::{BuildResult, Pipeline};
use crate::{debug, log};

/// Default quiet period before a batch of changes triggers a rebuild.
pub const DEBOUNCE: Duration = Duration::from_millis(200);

/// A directory to watch and whether to descend into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRoot {
    pub path: PathBuf,
    pub recursive: bool,
}

/// The directories whose changes affect a build of `config`.
pub fn watch_roots(config: &BuildConfig) -> Vec<WatchRoot> {
    // path → recursive; a recursive watch absorbs a flat one on the same dir.
    let mut roots: BTreeMap<PathBuf, bool> = BTreeMap::new();
    let mut add = |path: &Path, recursive: bool| {
        if path.starts_with(&config.output_dir) {
            return;
        }
        let entry = roots.entry(path.to_path_buf()).or_insert(recursive);
        *entry |= recursive;
    };

    if let Some(dir) = config.entry_path.parent() {
        add(dir, true);
    }
    if let Some(dir) = config.html_template_path.parent() {
        add(dir, false);
    }
    for set in config.asset_sets() {
        add(&set.from, true);
    }

    roots
        .into_iter()
        .map(|(path, recursive)| WatchRoot { path, recursive })
        .collect()
}

/// Whether a change at `path` should trigger a rebuild.
pub fn is_relevant(path: &Path, config: &BuildConfig) -> bool {
    !path.starts_with(&config.output_dir)
}

/// Run one build, logging instead of returning failures.
pub fn rebuild(config: &BuildConfig) -> Option<BuildResult> {
    match Pipeline::new(config.clone()).run() {
        Ok(result) => Some(result),
        Err(e) => {
            log!("failed"; "{e}");
            None
        }
    }
}

/// Build once, then rebuild on every relevant change. Blocks until the
/// watcher channel closes.
pub fn watch_and_rebuild(config: BuildConfig, debounce: Duration) -> Result<()> {
    let (tx, rx) = channel();
    let mut debouncer =
        new_debouncer(debounce, tx).map_err(|e| BuildError::watch(format!("cannot start: {e}")))?;

    for root in watch_roots(&config) {
        if !root.path.exists() {
            debug!("watch"; "skipping missing {}", root.path.display());
            continue;
        }
        let mode = if root.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        debouncer
            .watcher()
            .watch(&root.path, mode)
            .map_err(|e| BuildError::watch(format!("{}: {e}", root.path.display())))?;
        debug!("watch"; "{}", root.path.display());
    }

    rebuild(&config);
    log!("watch"; "waiting for changes");

    for result in rx {
        match result {
            Ok(events) => {
                let changed: Vec<&Path> = events
                    .iter()
                    .filter(|e| matches!(e.kind, DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous))
                    .map(|e| e.path.as_path())
                    .filter(|p| is_relevant(p, &config))
                    .collect();
                if changed.is_empty() {
                    continue;
                }
                for path in &changed {
                    debug!("watch"; "changed {}", path.display());
                }
                log!("watch"; "{} change(s), rebuilding", changed.len());
                rebuild(&config);
            }
            Err(e) => log!("watch"; "error: {e}"),
        }
    }

    Ok(())
}
