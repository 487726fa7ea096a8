//! Module graph. Loads the entry module and every relative module it
//! reaches, in dependency order.
//!
//! Resolution rules for a specifier `./x`:
//! - `./x` exactly, then `./x.js`, `./x.mjs`, then `./x/index.js`
//! - bare specifiers (`lit`, `@scope/pkg`) and URLs are left external
//! - a circular import chain is rejected

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::bundle::scan::{self, is_local_specifier, ModuleSyntax};
use crate::debug;
use crate::error::{BuildError, Result};
use crate::lexer;

/// One source module.
#[derive(Debug)]
pub struct Module {
    /// Canonical path.
    pub path: PathBuf,
    pub source: String,
    pub syntax: ModuleSyntax,
    /// Local specifier → index of the module it resolved to.
    pub deps: HashMap<String, usize>,
}

impl Module {
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }
}

/// Every module reachable from the entry; dependencies before dependents,
/// the entry last.
#[derive(Debug)]
pub struct ModuleGraph {
    pub modules: Vec<Module>,
}

impl ModuleGraph {
    pub fn entry_index(&self) -> usize {
        self.modules.len().saturating_sub(1)
    }

    /// Module paths relative to the entry's directory, for banners and logs.
    pub fn display_name(&self, index: usize) -> String {
        let path = &self.modules[index].path;
        let root = self.modules[self.entry_index()].dir();
        match path.strip_prefix(root) {
            Ok(rel) => format!("./{}", rel.display()),
            Err(_) => path.display().to_string(),
        }
    }
}

/// Load the graph rooted at `entry`.
pub fn resolve_graph(entry: &Path) -> Result<ModuleGraph> {
    let canonical = entry
        .canonicalize()
        .map_err(|_| BuildError::resolution(entry, "entry module does not exist"))?;

    let mut builder = GraphBuilder::default();
    builder.visit(&canonical)?;
    Ok(ModuleGraph {
        modules: builder.modules,
    })
}

#[derive(Default)]
struct GraphBuilder {
    modules: Vec<Module>,
    index: HashMap<PathBuf, usize>,
    /// Modules whose dependencies are still being loaded.
    stack: Vec<PathBuf>,
}

impl GraphBuilder {
    fn visit(&mut self, path: &Path) -> Result<usize> {
        if let Some(&idx) = self.index.get(path) {
            return Ok(idx);
        }

        if let Some(pos) = self.stack.iter().position(|p| p == path) {
            let chain: Vec<String> = self.stack[pos..]
                .iter()
                .chain(std::iter::once(&path.to_path_buf()))
                .map(|p| file_label(p))
                .collect();
            return Err(BuildError::resolution(
                path,
                format!("circular import: {}", chain.join(" -> ")),
            ));
        }

        debug!("bundle"; "loading {}", path.display());
        let source = fs::read_to_string(path)
            .map_err(|e| BuildError::resolution(path, format!("cannot read module: {e}")))?;
        let tokens = lexer::lex(&source);
        let syntax = scan::scan(&source, &tokens).map_err(|msg| BuildError::resolution(path, msg))?;

        self.stack.push(path.to_path_buf());
        let base_dir = path.parent().unwrap_or(Path::new("."));
        let mut deps = HashMap::new();
        for specifier in syntax.local_specifiers() {
            if deps.contains_key(specifier) {
                continue;
            }
            let resolved = resolve_specifier(specifier, base_dir).ok_or_else(|| {
                BuildError::resolution(path, format!("cannot find module '{specifier}'"))
            })?;
            if resolved.extension().is_some_and(|ext| ext == "wasm") {
                return Err(BuildError::resolution(
                    path,
                    format!(
                        "static import of WebAssembly module '{specifier}' needs an external \
                         bundler (set `bundler = {{ command = \"..\" }}` in the [build] section)"
                    ),
                ));
            }
            let idx = self.visit(&resolved)?;
            deps.insert(specifier.to_string(), idx);
        }
        self.stack.pop();

        let idx = self.modules.len();
        self.modules.push(Module {
            path: path.to_path_buf(),
            source,
            syntax,
            deps,
        });
        self.index.insert(path.to_path_buf(), idx);
        Ok(idx)
    }
}

/// Find the file a relative specifier names, canonicalized.
fn resolve_specifier(specifier: &str, base_dir: &Path) -> Option<PathBuf> {
    debug_assert!(is_local_specifier(specifier));
    let exact = base_dir.join(specifier);
    let candidates = [
        exact.clone(),
        base_dir.join(format!("{specifier}.js")),
        base_dir.join(format!("{specifier}.mjs")),
        exact.join("index.js"),
    ];
    candidates
        .iter()
        .find(|candidate| candidate.is_file())
        .and_then(|found| found.canonicalize().ok())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    fn names(graph: &ModuleGraph) -> Vec<String> {
        (0..graph.modules.len()).map(|i| graph.display_name(i)).collect()
    }

    #[test]
    fn dependencies_come_before_the_entry() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "b.js", "export const b = 1;");
        write(tmp.path(), "a.js", "import { b } from './b.js'; export const a = b;");
        let entry = write(tmp.path(), "main.js", "import { a } from './a.js'; import { b } from './b';");

        let graph = resolve_graph(&entry).unwrap();
        assert_eq!(names(&graph), vec!["./b.js", "./a.js", "./main.js"]);
    }

    #[test]
    fn shared_dependency_is_loaded_once() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "shared.js", "export const s = 1;");
        write(tmp.path(), "left.js", "import { s } from './shared.js'; export const l = s;");
        write(tmp.path(), "right.js", "import { s } from './shared.js'; export const r = s;");
        let entry = write(
            tmp.path(),
            "main.js",
            "import { l } from './left.js'; import { r } from './right.js';",
        );

        let graph = resolve_graph(&entry).unwrap();
        assert_eq!(graph.modules.len(), 4);
        assert_eq!(graph.display_name(0), "./shared.js");
    }

    #[test]
    fn extension_and_index_fallbacks() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "util.mjs", "export const u = 1;");
        write(tmp.path(), "lib/index.js", "export const l = 1;");
        let entry = write(tmp.path(), "main.js", "import { u } from './util'; import { l } from './lib';");

        let graph = resolve_graph(&entry).unwrap();
        assert_eq!(names(&graph), vec!["./util.mjs", "./lib/index.js", "./main.js"]);
    }

    #[test]
    fn bare_specifiers_stay_external() {
        let tmp = tempfile::tempdir().unwrap();
        let entry = write(tmp.path(), "main.js", "import { html } from 'lit'; import x from '/abs.js';");
        let graph = resolve_graph(&entry).unwrap();
        assert_eq!(graph.modules.len(), 1);
        assert!(graph.modules[0].deps.is_empty());
    }

    #[test]
    fn circular_import_is_reported_with_chain() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.js", "import './b.js';");
        write(tmp.path(), "b.js", "import './a.js';");
        let entry = write(tmp.path(), "main.js", "import './a.js';");

        let err = resolve_graph(&entry).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Resolution { .. }));
        assert!(err.to_string().contains("a.js -> b.js -> a.js"), "{err}");
    }

    #[test]
    fn missing_import_names_the_importer() {
        let tmp = tempfile::tempdir().unwrap();
        let entry = write(tmp.path(), "main.js", "import { x } from './gone.js';");
        let err = resolve_graph(&entry).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("main.js"), "{msg}");
        assert!(msg.contains("./gone.js"), "{msg}");
    }

    #[test]
    fn static_wasm_import_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("app_bg.wasm"), [0u8, 97, 115, 109]).unwrap();
        let entry = write(tmp.path(), "main.js", "import * as wasm from './app_bg.wasm';");
        let err = resolve_graph(&entry).unwrap_err();
        assert!(err.to_string().contains("external bundler"), "{err}");
    }

    #[test]
    fn missing_entry_is_a_resolution_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolve_graph(&tmp.path().join("nope.js")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Resolution { .. }));
    }
}
