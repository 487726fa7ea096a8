//! Build configuration: the `wasmdist.toml` schema, profile overlays, and
//! the validated [`BuildConfig`] record a single pipeline run consumes.
//!
//! Relative paths in the file resolve against the file's own directory;
//! relative paths given on the command line resolve against the working
//! directory. After resolution every path in a `BuildConfig` is absolute.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, IoContext, Result};

/// File name searched for when no `--config` is given.
pub const CONFIG_FILE: &str = "wasmdist.toml";

/// Marker a template may carry to pin the script insertion point.
pub const BUNDLE_MARKER: &str = "<!-- wasmdist:bundle -->";

// ── Validated run configuration ───────────────────────────────────────

/// Immutable description of one build run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildConfig {
    /// WebAssembly glue script the bundler starts from.
    pub entry_path: PathBuf,
    pub output_dir: PathBuf,
    /// Bundle file name; a single path segment.
    pub output_filename: String,
    /// Optional static asset tree. A missing directory is not an error.
    pub asset_source_dir: Option<PathBuf>,
    /// Where the asset tree lands, relative to `output_dir` (`.` for the root).
    pub asset_dest_subpath: PathBuf,
    pub html_template_path: PathBuf,
    /// Further `(from, to)` asset trees copied alongside the main one.
    pub extra_assets: Vec<CopyPattern>,
    pub script_loading: ScriptLoading,
    pub bundler: BundlerChoice,
}

/// One asset tree and its destination subpath under the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyPattern {
    pub from: PathBuf,
    #[serde(default = "default_copy_to")]
    pub to: PathBuf,
}

fn default_copy_to() -> PathBuf {
    PathBuf::from(".")
}

/// How the injected `<script>` tag loads the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptLoading {
    /// `<script type="module">`, required by wasm-bindgen `--target web` glue.
    #[default]
    Module,
    /// `<script defer>`
    Defer,
    /// Plain blocking `<script>`.
    Blocking,
}

/// Which collaborator links the entry module graph.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum BundlerChoice {
    /// Built-in scope-hoisting linker.
    #[default]
    Linker,
    /// External program; `{entry}` and `{output}` are substituted in `args`.
    Command { program: String, args: Vec<String> },
}

impl BuildConfig {
    /// A configuration with the project defaults, rooted at `base_dir`.
    pub fn with_defaults(base_dir: &Path) -> Result<Self> {
        BuildSection::default().resolve(base_dir)
    }

    /// Path of the emitted bundle.
    pub fn bundle_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_filename)
    }

    /// Every `(source, destination subpath)` asset set, main tree first.
    pub fn asset_sets(&self) -> Vec<CopyPattern> {
        let mut sets = Vec::with_capacity(self.extra_assets.len() + 1);
        if let Some(dir) = &self.asset_source_dir {
            sets.push(CopyPattern {
                from: dir.clone(),
                to: self.asset_dest_subpath.clone(),
            });
        }
        sets.extend(self.extra_assets.iter().cloned());
        sets
    }

    /// Apply command-line overrides, resolving their paths against `cwd`.
    pub fn apply_overrides(mut self, overrides: &Overrides, cwd: &Path) -> Self {
        if let Some(p) = &overrides.entry {
            self.entry_path = absolutize(cwd, p);
        }
        if let Some(p) = &overrides.output_dir {
            self.output_dir = absolutize(cwd, p);
        }
        if let Some(name) = &overrides.output_filename {
            self.output_filename = name.clone();
        }
        if let Some(p) = &overrides.asset_source_dir {
            self.asset_source_dir = Some(absolutize(cwd, p));
        }
        if let Some(p) = &overrides.asset_dest_subpath {
            self.asset_dest_subpath = p.clone();
        }
        if let Some(p) = &overrides.html_template {
            self.html_template_path = absolutize(cwd, p);
        }
        self
    }

    /// Check every invariant a run relies on.
    pub fn validate(&self) -> Result<()> {
        validate_filename(&self.output_filename)?;
        validate_subpath("asset_dest_subpath", &self.asset_dest_subpath)?;
        for pattern in &self.extra_assets {
            validate_subpath("copy.to", &pattern.to)?;
        }

        let absolute = [
            ("entry", &self.entry_path),
            ("output_dir", &self.output_dir),
            ("html_template", &self.html_template_path),
        ];
        for (name, path) in absolute {
            if !path.is_absolute() {
                return Err(BuildError::config(format!(
                    "{name} must be resolved to an absolute path, got '{}'",
                    path.display()
                )));
            }
        }

        if self.output_dir.parent().is_none() {
            return Err(BuildError::config("output_dir cannot be a filesystem root"));
        }

        // Cleaning the output directory must never delete an input.
        let mut inputs = vec![&self.entry_path, &self.html_template_path];
        inputs.extend(self.asset_source_dir.iter());
        inputs.extend(self.extra_assets.iter().map(|p| &p.from));
        for input in inputs {
            if input.starts_with(&self.output_dir) {
                return Err(BuildError::config(format!(
                    "output_dir '{}' contains the input '{}'; cleaning it would delete sources",
                    self.output_dir.display(),
                    input.display()
                )));
            }
        }

        // The copier would walk the output it is writing into.
        let asset_roots = self
            .asset_source_dir
            .iter()
            .chain(self.extra_assets.iter().map(|p| &p.from));
        for root in asset_roots {
            if self.output_dir.starts_with(root) {
                return Err(BuildError::config(format!(
                    "output_dir '{}' lies inside the asset source '{}'",
                    self.output_dir.display(),
                    root.display()
                )));
            }
        }

        if let BundlerChoice::Command { program, .. } = &self.bundler {
            if program.trim().is_empty() {
                return Err(BuildError::config("bundler command cannot be empty"));
            }
        }

        Ok(())
    }
}

fn validate_filename(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(BuildError::config(format!(
            "output_filename '{name}' is not a file name"
        )));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(BuildError::config(format!(
            "output_filename '{name}' must be a single path segment"
        )));
    }
    Ok(())
}

fn validate_subpath(field: &str, path: &Path) -> Result<()> {
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(BuildError::config(format!(
                    "{field} '{}' must stay inside the output directory",
                    path.display()
                )));
            }
        }
    }
    Ok(())
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub entry: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub output_filename: Option<String>,
    pub asset_source_dir: Option<PathBuf>,
    pub asset_dest_subpath: Option<PathBuf>,
    pub html_template: Option<PathBuf>,
}

// ── File schema ───────────────────────────────────────────────────────

/// Parsed `wasmdist.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectFile {
    #[serde(default)]
    pub build: BuildSection,
    /// Named overlays on `[build]`, e.g. `[profile.dev]`.
    #[serde(default)]
    pub profile: BTreeMap<String, ProfileSection>,
    #[serde(default)]
    pub serve: ServeSection,
}

/// `[build]`: shared defaults for every profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    #[serde(default = "default_entry")]
    pub entry: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_output_filename")]
    pub output_filename: String,
    #[serde(default = "default_asset_source_dir")]
    pub asset_source_dir: Option<PathBuf>,
    #[serde(default = "default_asset_dest_subpath")]
    pub asset_dest_subpath: PathBuf,
    #[serde(default = "default_html_template")]
    pub html_template: PathBuf,
    #[serde(default)]
    pub script_loading: ScriptLoading,
    #[serde(default)]
    pub bundler: Option<BundlerSection>,
    #[serde(default)]
    pub copy: Vec<CopyPattern>,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            entry: default_entry(),
            output_dir: default_output_dir(),
            output_filename: default_output_filename(),
            asset_source_dir: default_asset_source_dir(),
            asset_dest_subpath: default_asset_dest_subpath(),
            html_template: default_html_template(),
            script_loading: ScriptLoading::default(),
            bundler: None,
            copy: Vec::new(),
        }
    }
}

fn default_entry() -> PathBuf {
    PathBuf::from("../target/wasm.js")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_output_filename() -> String {
    "wasm.js".to_string()
}

fn default_asset_source_dir() -> Option<PathBuf> {
    Some(PathBuf::from("../assets"))
}

fn default_asset_dest_subpath() -> PathBuf {
    PathBuf::from("assets")
}

fn default_html_template() -> PathBuf {
    PathBuf::from("index.html")
}

/// `bundler = "linker"` or `bundler = { command = "...", args = [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BundlerSection {
    Named(String),
    Command {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// `[profile.<name>]`: any subset of `[build]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileSection {
    pub entry: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub output_filename: Option<String>,
    pub asset_source_dir: Option<PathBuf>,
    pub asset_dest_subpath: Option<PathBuf>,
    pub html_template: Option<PathBuf>,
    pub script_loading: Option<ScriptLoading>,
    pub bundler: Option<BundlerSection>,
    pub copy: Option<Vec<CopyPattern>>,
}

/// `[serve]`: dev server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServeSection {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public prefix the asset tree is served under.
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            url_prefix: default_url_prefix(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8080
}

fn default_url_prefix() -> String {
    "/assets".to_string()
}

impl ProjectFile {
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| BuildError::config(e.to_string()))
    }

    /// Names of the declared profiles, sorted.
    pub fn profiles(&self) -> Vec<&str> {
        self.profile.keys().map(String::as_str).collect()
    }

    /// Produce the `BuildConfig` for `profile` (or plain `[build]`).
    pub fn build_config(&self, profile: Option<&str>, base_dir: &Path) -> Result<BuildConfig> {
        let section = match profile {
            None => self.build.clone(),
            Some(name) => {
                let overlay = self.profile.get(name).ok_or_else(|| {
                    BuildError::config(format!(
                        "unknown profile '{name}' (declared: {})",
                        self.profiles().join(", ")
                    ))
                })?;
                self.build.overlay(overlay)
            }
        };
        section.resolve(base_dir)
    }
}

impl BuildSection {
    fn overlay(&self, profile: &ProfileSection) -> Self {
        let mut out = self.clone();
        if let Some(v) = &profile.entry {
            out.entry = v.clone();
        }
        if let Some(v) = &profile.output_dir {
            out.output_dir = v.clone();
        }
        if let Some(v) = &profile.output_filename {
            out.output_filename = v.clone();
        }
        if let Some(v) = &profile.asset_source_dir {
            out.asset_source_dir = Some(v.clone());
        }
        if let Some(v) = &profile.asset_dest_subpath {
            out.asset_dest_subpath = v.clone();
        }
        if let Some(v) = &profile.html_template {
            out.html_template = v.clone();
        }
        if let Some(v) = profile.script_loading {
            out.script_loading = v;
        }
        if let Some(v) = &profile.bundler {
            out.bundler = Some(v.clone());
        }
        if let Some(v) = &profile.copy {
            out.copy = v.clone();
        }
        out
    }

    fn resolve(self, base_dir: &Path) -> Result<BuildConfig> {
        let bundler = match self.bundler {
            None => BundlerChoice::Linker,
            Some(BundlerSection::Named(name)) if name == "linker" => BundlerChoice::Linker,
            Some(BundlerSection::Named(name)) => {
                return Err(BuildError::config(format!(
                    "unknown bundler '{name}' (use \"linker\" or {{ command = \"...\" }})"
                )));
            }
            Some(BundlerSection::Command { command, args }) => BundlerChoice::Command {
                program: command,
                args,
            },
        };

        Ok(BuildConfig {
            entry_path: absolutize(base_dir, &self.entry),
            output_dir: absolutize(base_dir, &self.output_dir),
            output_filename: self.output_filename,
            asset_source_dir: self.asset_source_dir.map(|p| absolutize(base_dir, &p)),
            asset_dest_subpath: self.asset_dest_subpath,
            html_template_path: absolutize(base_dir, &self.html_template),
            extra_assets: self
                .copy
                .into_iter()
                .map(|p| CopyPattern {
                    from: absolutize(base_dir, &p.from),
                    to: p.to,
                })
                .collect(),
            script_loading: self.script_loading,
            bundler,
        })
    }
}

// ── Discovery and loading ─────────────────────────────────────────────

/// A loaded project: parsed file plus the directory its paths resolve against.
#[derive(Debug, Clone)]
pub struct Project {
    pub file: ProjectFile,
    pub base_dir: PathBuf,
    /// `None` when running on built-in defaults.
    pub source: Option<PathBuf>,
}

/// Find `wasmdist.toml` by walking up from `start`.
pub fn find_config_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Load the project from an explicit path, by discovery, or from defaults.
pub fn load_project(explicit: Option<&Path>) -> Result<Project> {
    let cwd = env::current_dir().at(".")?;
    let path = match explicit {
        Some(p) => {
            let p = absolutize(&cwd, p);
            if !p.is_file() {
                return Err(BuildError::not_found(&p));
            }
            Some(p)
        }
        None => find_config_from(&cwd),
    };

    match path {
        Some(path) => {
            let contents = fs::read_to_string(&path).at(&path)?;
            let file: ProjectFile = toml::from_str(&contents)
                .map_err(|e| BuildError::config(format!("{}: {e}", path.display())))?;
            let base_dir = path.parent().map(Path::to_path_buf).unwrap_or(cwd);
            Ok(Project {
                file,
                base_dir,
                source: Some(path),
            })
        }
        None => Ok(Project {
            file: ProjectFile::default(),
            base_dir: cwd,
            source: None,
        }),
    }
}

// ── Path helpers ──────────────────────────────────────────────────────

/// Join `path` onto `base` unless already absolute, then fold `.` and `..`
/// lexically so the result never depends on the filesystem.
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    normalize(&joined)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
