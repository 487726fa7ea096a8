//! External bundler. Delegates linking to a program such as esbuild or
//! rollup. `{entry}` and `{output}` in the arguments are replaced with the
//! absolute entry and bundle paths.

use std::path::Path;
use std::process::Command;

use crate::bundle::{BundleOutput, Bundler};
use crate::error::{BuildError, Result};
use crate::{debug, log};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBundler {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandBundler {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn resolve_args(&self, entry: &Path, output_file: &Path) -> Vec<String> {
        let entry = entry.display().to_string();
        let output = output_file.display().to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{entry}", &entry).replace("{output}", &output))
            .collect()
    }
}

impl Bundler for CommandBundler {
    fn name(&self) -> &str {
        &self.program
    }

    fn bundle(&self, entry: &Path, output_file: &Path) -> Result<BundleOutput> {
        let args = self.resolve_args(entry, output_file);
        log!("bundle"; "`{} {}` running", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(entry.parent().unwrap_or(Path::new(".")))
            .output()
            .map_err(|e| {
                BuildError::resolution(entry, format!("cannot run bundler `{}`: {e}", self.program))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            debug!("bundle"; "{line}");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            let status = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(BuildError::resolution(
                entry,
                if detail.is_empty() {
                    format!("bundler `{}` exited with {status}", self.program)
                } else {
                    format!("bundler `{}` exited with {status}: {detail}", self.program)
                },
            ));
        }

        if !output_file.is_file() {
            return Err(BuildError::resolution(
                entry,
                format!(
                    "bundler `{}` did not write {}",
                    self.program,
                    output_file.display()
                ),
            ));
        }

        Ok(BundleOutput {
            bundle_file: output_file.to_path_buf(),
            linked_files: Vec::new(),
        })
    }
}
