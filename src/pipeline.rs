//! Build orchestrator.
//!
//! A run walks a fixed sequence of stages:
//!
//! ```text
//! Idle → Cleaning → Bundling → CopyingAssets → InjectingTemplate → Done
//!            └──────────┴────────────┴─────────────────┴──────────→ Failed
//! ```
//!
//! There is no rollback. Whatever a failed run left behind is removed by the
//! next run's Cleaning stage.

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;

use crate::assets;
use crate::bundle::{self, Bundler};
use crate::clean;
use crate::config::BuildConfig;
use crate::error::{BuildError, Result};
use crate::html;
use crate::{debug, log};

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Idle,
    Cleaning,
    Bundling,
    CopyingAssets,
    InjectingTemplate,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Cleaning => "cleaning",
            Stage::Bundling => "bundling",
            Stage::CopyingAssets => "copying-assets",
            Stage::InjectingTemplate => "injecting-template",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paths a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildResult {
    pub bundle_file: PathBuf,
    pub html_file: PathBuf,
    /// Copied asset files in sorted order.
    pub copied_assets: Vec<PathBuf>,
    /// Files the bundler placed beside the bundle.
    pub linked_files: Vec<PathBuf>,
}

/// One build run over an immutable [`BuildConfig`].
pub struct Pipeline {
    config: BuildConfig,
    bundler: Box<dyn Bundler>,
    state: Stage,
    history: Vec<Stage>,
}

impl Pipeline {
    /// A pipeline using the bundler the configuration names.
    pub fn new(config: BuildConfig) -> Self {
        let bundler = bundle::bundler_for(&config.bundler);
        Self::with_bundler(config, bundler)
    }

    pub fn with_bundler(config: BuildConfig, bundler: Box<dyn Bundler>) -> Self {
        Self {
            config,
            bundler,
            state: Stage::Idle,
            history: vec![Stage::Idle],
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn state(&self) -> Stage {
        self.state
    }

    /// Every state visited so far, starting with `Idle`.
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    /// Execute all stages. A pipeline runs once; build again with a new one.
    pub fn run(&mut self) -> Result<BuildResult> {
        if self.state != Stage::Idle {
            return Err(BuildError::config(format!(
                "pipeline already ran (state: {}); create a new one to rebuild",
                self.state
            )));
        }

        let started = Instant::now();
        let result = self.execute();
        match &result {
            Ok(_) => {
                self.enter(Stage::Done);
                log!("done"; "built in {:.2?}", started.elapsed());
            }
            Err(_) => self.enter(Stage::Failed),
        }
        result
    }

    fn execute(&mut self) -> Result<BuildResult> {
        self.config.validate()?;

        self.enter(Stage::Cleaning);
        let removed = clean::clean(&self.config.output_dir).map_err(at(Stage::Cleaning))?;
        if removed {
            debug!("clean"; "removed {}", self.config.output_dir.display());
        }

        self.enter(Stage::Bundling);
        let bundled = bundle::bundle_with(
            self.bundler.as_ref(),
            &self.config.entry_path,
            &self.config.output_dir,
            &self.config.output_filename,
        )
        .map_err(at(Stage::Bundling))?;
        log!("bundle"; "{} -> {}", self.config.entry_path.display(), bundled.bundle_file.display());

        self.enter(Stage::CopyingAssets);
        let copied_assets = assets::copy_asset_sets(&self.config.asset_sets(), &self.config.output_dir)
            .map_err(at(Stage::CopyingAssets))?;
        log!("copy"; "{} file(s) -> {}", copied_assets.len(), self.config.output_dir.display());

        self.enter(Stage::InjectingTemplate);
        let html_file = html::inject_and_write_with(
            &self.config.html_template_path,
            &self.config.output_filename,
            &self.config.output_dir,
            self.config.script_loading,
        )
        .map_err(at(Stage::InjectingTemplate))?;
        log!("html"; "{}", html_file.display());

        Ok(BuildResult {
            bundle_file: bundled.bundle_file,
            html_file,
            copied_assets,
            linked_files: bundled.linked_files,
        })
    }

    fn enter(&mut self, next: Stage) {
        debug!("pipeline"; "{} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

fn at(stage: Stage) -> impl Fn(BuildError) -> BuildError {
    move |e| e.in_stage(stage)
}
