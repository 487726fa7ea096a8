//! Entry bundler: turns the entry module and everything it imports into a
//! single script at `output_dir/output_filename`.
//!
//! Linking is behind the [`Bundler`] trait. The built-in [`Linker`] hoists
//! relative ES modules into one scope; [`CommandBundler`] hands the job to
//! an external program.

pub mod command;
pub mod graph;
pub mod link;
pub mod scan;

use std::fs;
use std::path::{Path, PathBuf};

pub use command::CommandBundler;

use crate::config::BundlerChoice;
use crate::debug;
use crate::error::{BuildError, IoContext, Result};

/// Files a bundler wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOutput {
    pub bundle_file: PathBuf,
    /// Files referenced by URL from the bundle and written beside it.
    pub linked_files: Vec<PathBuf>,
}

/// Links an entry module into one output file.
pub trait Bundler: Send + Sync {
    fn name(&self) -> &str;

    /// Write the bundle for `entry` to `output_file`. The parent directory
    /// already exists.
    fn bundle(&self, entry: &Path, output_file: &Path) -> Result<BundleOutput>;
}

/// The built-in scope-hoisting linker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linker;

impl Bundler for Linker {
    fn name(&self) -> &str {
        "linker"
    }

    fn bundle(&self, entry: &Path, output_file: &Path) -> Result<BundleOutput> {
        let graph = graph::resolve_graph(entry)?;
        let linked = link::link(&graph)?;
        debug!("bundle"; "linked {} module(s)", graph.modules.len());

        let out_dir = output_file.parent().unwrap_or(Path::new("."));
        let bundle_name = output_file.file_name().map(|n| n.to_string_lossy().into_owned());

        let mut linked_files = Vec::with_capacity(linked.assets.len());
        for asset in &linked.assets {
            if Some(&asset.file_name) == bundle_name.as_ref() {
                return Err(BuildError::resolution(
                    entry,
                    format!("referenced file '{}' has the same name as the bundle", asset.file_name),
                ));
            }
            let dest = out_dir.join(&asset.file_name);
            fs::copy(&asset.source, &dest).at(&asset.source)?;
            linked_files.push(dest);
        }

        fs::write(output_file, linked.code).at(output_file)?;

        Ok(BundleOutput {
            bundle_file: output_file.to_path_buf(),
            linked_files,
        })
    }
}

/// The bundler a configuration asks for.
pub fn bundler_for(choice: &BundlerChoice) -> Box<dyn Bundler> {
    match choice {
        BundlerChoice::Linker => Box::new(Linker),
        BundlerChoice::Command { program, args } => {
            Box::new(CommandBundler::new(program.clone(), args.clone()))
        }
    }
}

/// Bundle `entry_path` with the built-in linker; returns the bundle path.
pub fn bundle(entry_path: &Path, output_dir: &Path, output_filename: &str) -> Result<PathBuf> {
    bundle_with(&Linker, entry_path, output_dir, output_filename).map(|out| out.bundle_file)
}

/// Bundle `entry_path` with `bundler` into `output_dir/output_filename`,
/// creating `output_dir` when needed.
pub fn bundle_with(
    bundler: &dyn Bundler,
    entry_path: &Path,
    output_dir: &Path,
    output_filename: &str,
) -> Result<BundleOutput> {
    if !entry_path.is_file() {
        return Err(BuildError::resolution(entry_path, "entry module does not exist"));
    }
    fs::create_dir_all(output_dir).at(output_dir)?;
    let output_file = output_dir.join(output_filename);
    debug!("bundle"; "{} -> {} ({})", entry_path.display(), output_file.display(), bundler.name());
    bundler.bundle(entry_path, &output_file)
}
