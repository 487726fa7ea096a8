//! Scope-hoisting linker: concatenates a [`ModuleGraph`] into one module.
//!
//! Every module body is emitted once, in dependency order. Import statements
//! between linked modules are replaced by `const` aliases where the local
//! name differs from the exported binding, and `export` keywords are dropped
//! from everything except the entry. The entry keeps its export surface.
//!
//! Top-level names, private ones included, must be unique across the linked
//! modules; a clash is reported rather than renamed. Two modules importing
//! the same binding under the same local name share one alias. An alias is a
//! copy, so a `let`/`var` export can only be imported under its own name.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Range;
use std::path::PathBuf;

use crate::bundle::graph::{Module, ModuleGraph};
use crate::bundle::scan::{is_local_specifier, ExportDecl, ImportBinding};
use crate::debug;
use crate::error::{BuildError, Result};

/// Linked program text plus the files it references by URL.
#[derive(Debug)]
pub struct LinkOutput {
    pub code: String,
    pub assets: Vec<LinkedAsset>,
}

/// A file referenced through `new URL(.., import.meta.url)`, to be placed
/// next to the bundle under `file_name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LinkedAsset {
    pub source: PathBuf,
    pub file_name: String,
}

/// What an exported name refers to once linked.
#[derive(Debug, Clone, PartialEq)]
enum Binding {
    /// A top-level name declared somewhere in the bundle.
    Local(String),
    /// The namespace object of module `n`.
    Namespace(usize),
}

impl Binding {
    fn expr(&self) -> String {
        match self {
            Binding::Local(name) => name.clone(),
            Binding::Namespace(idx) => namespace_ident(*idx),
        }
    }
}

type ExportTable = BTreeMap<String, Binding>;

/// What introduces a top-level name of the linked program.
#[derive(Debug, Clone, PartialEq)]
enum Owner {
    /// A declaration in module `n`.
    Declared(usize),
    /// A statement emitted for an import in module `n`: a `const` alias or a
    /// hoisted external import. Identical statements are emitted once.
    Import(usize, String),
}

impl Owner {
    fn module(&self) -> usize {
        match self {
            Owner::Declared(idx) | Owner::Import(idx, _) => *idx,
        }
    }
}

fn namespace_ident(idx: usize) -> String {
    format!("__ns_{idx}")
}

fn default_ident(idx: usize) -> String {
    format!("__default_{idx}")
}

/// Link all modules of `graph` into a single module.
pub fn link(graph: &ModuleGraph) -> Result<LinkOutput> {
    let entry = graph.entry_index();
    let tables = export_tables(graph)?;
    check_top_level_names(graph, &tables)?;
    let namespaces = required_namespaces(graph, &tables);

    let mut externals: Vec<String> = Vec::new();
    let mut emitted_aliases: HashSet<String> = HashSet::new();
    let mut assets: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut body = String::new();

    for (idx, module) in graph.modules.iter().enumerate() {
        debug!("link"; "{}", graph.display_name(idx));
        let is_entry = idx == entry;
        let mut edits: Vec<(Range<usize>, String)> = Vec::new();

        for import in &module.syntax.imports {
            if !is_local_specifier(&import.specifier) {
                let statement = module.source[import.span.clone()].trim().to_string();
                if !externals.contains(&statement) {
                    externals.push(statement);
                }
                edits.push((import.span.clone(), String::new()));
                continue;
            }
            let dep = module.deps[&import.specifier];
            let mut aliases = Vec::new();
            for binding in &import.bindings {
                let (local, target) = import_target(binding, dep, module, &import.specifier, &tables)?;
                if let Some(alias) = alias_statement(local, &target) {
                    if emitted_aliases.insert(alias.clone()) {
                        aliases.push(alias);
                    }
                }
            }
            edits.push((import.span.clone(), aliases.join("\n")));
        }

        for export in &module.syntax.exports {
            if let Some(edit) = export_edit(idx, is_entry, module, export, &tables)? {
                edits.push(edit);
            }
        }

        for asset in &module.syntax.asset_refs {
            let source = module.dir().join(&asset.specifier);
            if !source.is_file() {
                return Err(BuildError::resolution(
                    &module.path,
                    format!("referenced file '{}' does not exist", asset.specifier),
                ));
            }
            let source = source.canonicalize().map_err(|e| BuildError::io(&source, e))?;
            let file_name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match assets.get(&file_name) {
                Some(existing) if *existing != source => {
                    return Err(BuildError::resolution(
                        &module.path,
                        format!(
                            "'{}' and '{}' would both be emitted as '{file_name}'",
                            existing.display(),
                            source.display()
                        ),
                    ));
                }
                _ => {
                    assets.insert(file_name.clone(), source);
                }
            }
            edits.push((asset.span.clone(), format!("\"{file_name}\"")));
        }

        body.push_str(&format!("// {}\n", graph.display_name(idx)));
        let rewritten = apply_edits(&module.source, edits);
        let rewritten = rewritten.trim();
        if !rewritten.is_empty() {
            body.push_str(rewritten);
            body.push('\n');
        }
        if namespaces.contains(&idx) {
            body.push_str(&namespace_object(idx, &tables[idx]));
        }
        body.push('\n');
    }

    let mut code = String::new();
    for statement in &externals {
        code.push_str(statement);
        code.push('\n');
    }
    if !externals.is_empty() {
        code.push('\n');
    }
    code.push_str(body.trim_end());
    code.push('\n');

    Ok(LinkOutput {
        code,
        assets: assets
            .into_iter()
            .map(|(file_name, source)| LinkedAsset { source, file_name })
            .collect(),
    })
}

fn lookup(table: &ExportTable, name: &str, importer: &Module, specifier: &str) -> Result<Binding> {
    table.get(name).cloned().ok_or_else(|| {
        BuildError::resolution(
            &importer.path,
            format!("'{specifier}' does not export '{name}'"),
        )
    })
}

/// The local name an import binding introduces and what it refers to.
fn import_target<'m>(
    binding: &'m ImportBinding,
    dep: usize,
    module: &Module,
    specifier: &str,
    tables: &[ExportTable],
) -> Result<(&'m str, Binding)> {
    Ok(match binding {
        ImportBinding::Default(local) => {
            (local.as_str(), lookup(&tables[dep], "default", module, specifier)?)
        }
        ImportBinding::Named { imported, local } => {
            (local.as_str(), lookup(&tables[dep], imported, module, specifier)?)
        }
        ImportBinding::Namespace(local) => (local.as_str(), Binding::Namespace(dep)),
    })
}

/// `const local = target;`, or nothing when the names already agree.
fn alias_statement(local: &str, target: &Binding) -> Option<String> {
    let expr = target.expr();
    (local != expr).then(|| format!("const {local} = {expr};"))
}

/// How an export statement is rewritten.
fn export_edit(
    idx: usize,
    is_entry: bool,
    module: &Module,
    export: &ExportDecl,
    tables: &[ExportTable],
) -> Result<Option<(Range<usize>, String)>> {
    let dep_of = |specifier: &str| -> Option<usize> {
        is_local_specifier(specifier).then(|| module.deps[specifier])
    };

    let edit = match export {
        ExportDecl::Declaration { keyword_span, .. } | ExportDecl::DefaultNamed { keyword_span, .. } => {
            (!is_entry).then(|| (keyword_span.clone(), String::new()))
        }
        ExportDecl::DefaultExpr { keyword_span } => {
            (!is_entry).then(|| (keyword_span.clone(), format!("const {} =", default_ident(idx))))
        }
        ExportDecl::List { span, .. } => (!is_entry).then(|| (span.clone(), String::new())),
        ExportDecl::ReexportNamed { specifier, items, span } => match dep_of(specifier) {
            None if is_entry => None,
            None => return Err(external_reexport(module, specifier)),
            Some(_) if !is_entry => Some((span.clone(), String::new())),
            Some(dep) => {
                let mut pairs = Vec::new();
                for (imported, exported) in items {
                    let binding = lookup(&tables[dep], imported, module, specifier)?;
                    pairs.push((binding.expr(), exported.clone()));
                }
                Some((span.clone(), export_list(&pairs)))
            }
        },
        ExportDecl::ReexportAll { specifier, span } => match dep_of(specifier) {
            None if is_entry => None,
            None => return Err(external_reexport(module, specifier)),
            Some(_) if !is_entry => Some((span.clone(), String::new())),
            Some(dep) => {
                let pairs: Vec<(String, String)> = tables[dep]
                    .iter()
                    .filter(|(name, _)| name.as_str() != "default")
                    .map(|(name, binding)| (binding.expr(), name.clone()))
                    .collect();
                Some((span.clone(), export_list(&pairs)))
            }
        },
        ExportDecl::ReexportNamespace { specifier, name, span } => match dep_of(specifier) {
            None if is_entry => None,
            None => return Err(external_reexport(module, specifier)),
            Some(_) if !is_entry => Some((span.clone(), String::new())),
            Some(dep) => Some((span.clone(), export_list(&[(namespace_ident(dep), name.clone())]))),
        },
    };
    Ok(edit)
}

fn external_reexport(module: &Module, specifier: &str) -> BuildError {
    BuildError::resolution(
        &module.path,
        format!("re-exporting external module '{specifier}' is only supported from the entry"),
    )
}

/// `export { a, b as c };`
fn export_list(pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return String::new();
    }
    let items: Vec<String> = pairs
        .iter()
        .map(|(local, exported)| {
            if local == exported {
                local.clone()
            } else if is_identifier(exported) {
                format!("{local} as {exported}")
            } else {
                format!("{local} as {exported:?}")
            }
        })
        .collect();
    format!("export {{ {} }};", items.join(", "))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Build the export table of every module, in dependency order.
fn export_tables(graph: &ModuleGraph) -> Result<Vec<ExportTable>> {
    let mut tables: Vec<ExportTable> = Vec::with_capacity(graph.modules.len());

    for (idx, module) in graph.modules.iter().enumerate() {
        let mut table = ExportTable::new();
        let mut star_sources = Vec::new();

        for export in &module.syntax.exports {
            match export {
                ExportDecl::Declaration { names, .. } => {
                    for name in names {
                        table.insert(name.clone(), Binding::Local(name.clone()));
                    }
                }
                ExportDecl::DefaultNamed { local, .. } => {
                    table.insert("default".into(), Binding::Local(local.clone()));
                }
                ExportDecl::DefaultExpr { .. } => {
                    table.insert("default".into(), Binding::Local(default_ident(idx)));
                }
                ExportDecl::List { items, .. } => {
                    for (local, exported) in items {
                        table.insert(exported.clone(), Binding::Local(local.clone()));
                    }
                }
                ExportDecl::ReexportNamed { specifier, items, .. } => {
                    if let Some(&dep) = module.deps.get(specifier) {
                        for (imported, exported) in items {
                            let binding = lookup(&tables[dep], imported, module, specifier)?;
                            table.insert(exported.clone(), binding);
                        }
                    }
                }
                ExportDecl::ReexportNamespace { specifier, name, .. } => {
                    if let Some(&dep) = module.deps.get(specifier) {
                        table.insert(name.clone(), Binding::Namespace(dep));
                    }
                }
                ExportDecl::ReexportAll { specifier, .. } => {
                    if let Some(&dep) = module.deps.get(specifier) {
                        star_sources.push(dep);
                    }
                }
            }
        }

        // Explicit exports shadow names arriving through `export *`.
        for dep in star_sources {
            for (name, binding) in &tables[dep] {
                if name != "default" {
                    table.entry(name.clone()).or_insert_with(|| binding.clone());
                }
            }
        }

        tables.push(table);
    }

    Ok(tables)
}

/// Every top-level name of every module lands in one scope once linked.
fn check_top_level_names(graph: &ModuleGraph, tables: &[ExportTable]) -> Result<()> {
    let mut owners: HashMap<&str, Owner> = HashMap::new();

    for (idx, module) in graph.modules.iter().enumerate() {
        for declared in &module.syntax.declarations {
            claim(&mut owners, graph, idx, &declared.name, Owner::Declared(idx))?;
        }

        for import in &module.syntax.imports {
            if !is_local_specifier(&import.specifier) {
                let statement = module.source[import.span.clone()].trim().to_string();
                for binding in &import.bindings {
                    let local = match binding {
                        ImportBinding::Default(local)
                        | ImportBinding::Named { local, .. }
                        | ImportBinding::Namespace(local) => local,
                    };
                    claim(&mut owners, graph, idx, local, Owner::Import(idx, statement.clone()))?;
                }
                continue;
            }

            let dep = module.deps[&import.specifier];
            for binding in &import.bindings {
                let (local, target) = import_target(binding, dep, module, &import.specifier, tables)?;
                let Some(alias) = alias_statement(local, &target) else {
                    continue;
                };
                if let Binding::Local(name) = &target {
                    if is_mutable(graph, &owners, name) {
                        return Err(BuildError::resolution(
                            &module.path,
                            format!(
                                "'{name}' from '{}' is reassignable; import it as '{name}' \
                                 instead of '{local}' to keep it live",
                                import.specifier
                            ),
                        ));
                    }
                }
                claim(&mut owners, graph, idx, local, Owner::Import(idx, alias))?;
            }
        }
    }
    Ok(())
}

fn claim<'g>(
    owners: &mut HashMap<&'g str, Owner>,
    graph: &ModuleGraph,
    idx: usize,
    name: &'g str,
    owner: Owner,
) -> Result<()> {
    match owners.get(name) {
        None => {
            owners.insert(name, owner);
            Ok(())
        }
        // A module redeclaring its own name is the module's own error.
        Some(existing) if existing.module() == idx => Ok(()),
        Some(Owner::Import(_, first)) if matches!(&owner, Owner::Import(_, text) if text == first) => Ok(()),
        Some(existing) => Err(BuildError::resolution(
            &graph.modules[idx].path,
            format!(
                "top-level '{name}' is also declared in {}",
                graph.display_name(existing.module())
            ),
        )),
    }
}

/// Whether `name` is a `let`/`var` declared by an already-claimed module.
fn is_mutable(graph: &ModuleGraph, owners: &HashMap<&str, Owner>, name: &str) -> bool {
    match owners.get(name) {
        Some(Owner::Declared(idx)) => graph.modules[*idx]
            .syntax
            .declaration(name)
            .is_some_and(|d| d.kind.is_mutable()),
        _ => false,
    }
}

/// Modules whose namespace object is referenced, including namespaces
/// reachable through other namespace objects.
fn required_namespaces(graph: &ModuleGraph, tables: &[ExportTable]) -> BTreeSet<usize> {
    let mut pending = Vec::new();
    for module in &graph.modules {
        for import in &module.syntax.imports {
            if import.bindings.iter().any(|b| matches!(b, ImportBinding::Namespace(_))) {
                if let Some(&dep) = module.deps.get(&import.specifier) {
                    pending.push(dep);
                }
            }
        }
    }
    for table in tables {
        for binding in table.values() {
            if let Binding::Namespace(dep) = binding {
                pending.push(*dep);
            }
        }
    }

    let mut required = BTreeSet::new();
    while let Some(idx) = pending.pop() {
        if required.insert(idx) {
            for binding in tables[idx].values() {
                if let Binding::Namespace(dep) = binding {
                    pending.push(*dep);
                }
            }
        }
    }
    required
}

fn namespace_object(idx: usize, table: &ExportTable) -> String {
    let mut out = format!("const {} = Object.freeze({{\n  __proto__: null,\n", namespace_ident(idx));
    for (name, binding) in table {
        out.push_str(&format!("  get {name:?}() {{ return {}; }},\n", binding.expr()));
    }
    out.push_str("});\n");
    out
}

fn apply_edits(source: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by_key(|(range, _)| range.start);
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for (range, replacement) in edits {
        if range.start < cursor {
            continue;
        }
        out.push_str(&source[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&source[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::graph::resolve_graph;
    use std::fs;
    use std::path::Path;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    fn link_entry(entry: &Path) -> Result<LinkOutput> {
        link(&resolve_graph(entry)?)
    }

    #[test]
    fn single_module_passes_through() {
        let tmp = tempfile::tempdir().unwrap();
        let entry = write(tmp.path(), "main.js", "export function start() { return 1; }\n");
        let out = link_entry(&entry).unwrap();
        assert_eq!(out.code, "// ./main.js\nexport function start() { return 1; }\n");
        assert!(out.assets.is_empty());
    }

    #[test]
    fn dependency_exports_are_hoisted_and_aliased() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "math.js", "export const add = (a, b) => a + b;\nexport function mul(a, b) { return a * b; }\n");
        let entry = write(
            tmp.path(),
            "main.js",
            "import { add, mul as times } from './math.js';\nexport const answer = times(add(1, 2), 14);\n",
        );

        let out = link_entry(&entry).unwrap();
        assert_eq!(
            out.code,
            "// ./math.js\nconst add = (a, b) => a + b;\nfunction mul(a, b) { return a * b; }\n\n\
             // ./main.js\nconst times = mul;\nexport const answer = times(add(1, 2), 14);\n"
        );
    }

    #[test]
    fn default_expression_gets_a_synthetic_name() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "glue.js", "function __wbg_init() {}\nexport default __wbg_init;\n");
        let entry = write(tmp.path(), "main.js", "import init from './glue.js';\ninit();\n");

        let out = link_entry(&entry).unwrap();
        assert!(out.code.contains("const __default_0 = __wbg_init;"), "{}", out.code);
        assert!(out.code.contains("const init = __default_0;"), "{}", out.code);
        assert!(!out.code.contains("export"), "{}", out.code);
    }

    #[test]
    fn namespace_import_builds_frozen_object() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "util.js", "export const a = 1;\nexport let b = 2;\n");
        let entry = write(tmp.path(), "main.js", "import * as util from './util.js';\nconsole.log(util.a);\n");

        let out = link_entry(&entry).unwrap();
        assert!(out.code.contains("const __ns_0 = Object.freeze({"), "{}", out.code);
        assert!(out.code.contains("get \"a\"() { return a; },"), "{}", out.code);
        assert!(out.code.contains("const util = __ns_0;"), "{}", out.code);
    }

    #[test]
    fn entry_reexports_become_local_export_lists() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.js", "export const one = 1;\nexport const two = 2;\n");
        let entry = write(
            tmp.path(),
            "main.js",
            "export { one as first } from './a.js';\nexport * from './a.js';\n",
        );

        let out = link_entry(&entry).unwrap();
        assert!(out.code.contains("export { one as first };"), "{}", out.code);
        assert!(out.code.contains("export { one, two };"), "{}", out.code);
    }

    #[test]
    fn external_imports_are_hoisted_once() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "view.js", "import { html } from 'lit';\nexport const view = () => html``;\n");
        let entry = write(
            tmp.path(),
            "main.js",
            "import { html } from 'lit';\nimport { view } from './view.js';\nview();\n",
        );

        let out = link_entry(&entry).unwrap();
        assert!(out.code.starts_with("import { html } from 'lit';\n\n"), "{}", out.code);
        assert_eq!(out.code.matches("from 'lit'").count(), 1);
    }

    #[test]
    fn missing_export_is_reported_against_the_importer() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.js", "export const a = 1;");
        let entry = write(tmp.path(), "main.js", "import { nope } from './a.js';");

        let err = link_entry(&entry).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("main.js"), "{msg}");
        assert!(msg.contains("does not export 'nope'"), "{msg}");
    }

    #[test]
    fn clashing_top_level_names_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.js", "export const init = 1;");
        write(tmp.path(), "b.js", "export function init() {}");
        let entry = write(tmp.path(), "main.js", "import './a.js';\nimport './b.js';");

        let err = link_entry(&entry).unwrap_err();
        assert!(err.to_string().contains("also declared in ./a.js"), "{err}");
    }

    #[test]
    fn shared_import_alias_is_emitted_once() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "glue.js", "function __wbg_init() {}\nexport default __wbg_init;\n");
        write(
            tmp.path(),
            "boot.js",
            "import init from './glue.js';\nexport function boot() { return init(); }\n",
        );
        let entry = write(
            tmp.path(),
            "main.js",
            "import init from './glue.js';\nimport { boot } from './boot.js';\ninit();\nboot();\n",
        );

        let out = link_entry(&entry).unwrap();
        assert_eq!(out.code.matches("const init = __default_0;").count(), 1, "{}", out.code);
        let alias = out.code.find("const init =").unwrap();
        let main = out.code.find("// ./main.js").unwrap();
        assert!(alias < main, "{}", out.code);
    }

    #[test]
    fn clashing_private_declarations_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.js", "let wasm;\nexport function a() { return wasm; }\n");
        let entry = write(tmp.path(), "main.js", "import { a } from './a.js';\nlet wasm;\na();\n");

        let err = link_entry(&entry).unwrap_err();
        assert!(matches!(err.kind, crate::error::ErrorKind::Resolution { .. }));
        assert!(err.to_string().contains("top-level 'wasm' is also declared in ./a.js"), "{err}");
    }

    #[test]
    fn import_alias_clashing_with_private_declaration_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "glue.js", "export default function start() {}\n");
        write(tmp.path(), "a.js", "let init = 0;\nexport const ready = init === 0;\n");
        let entry = write(
            tmp.path(),
            "main.js",
            "import init from './glue.js';\nimport { ready } from './a.js';\nif (ready) init();\n",
        );

        let err = link_entry(&entry).unwrap_err();
        assert!(err.to_string().contains("top-level 'init' is also declared in ./a.js"), "{err}");
    }

    #[test]
    fn reassignable_export_cannot_be_renamed_on_import() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "counter.js", "export let count = 0;\nexport function inc() { count++; }\n");
        let entry = write(
            tmp.path(),
            "main.js",
            "import { count as c, inc } from './counter.js';\ninc();\nconsole.log(c);\n",
        );

        let err = link_entry(&entry).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'count' from './counter.js' is reassignable"), "{msg}");
        assert!(msg.contains("instead of 'c'"), "{msg}");
    }

    #[test]
    fn reassignable_export_under_its_own_name_stays_live() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "counter.js", "export let count = 0;\nexport function inc() { count++; }\n");
        let entry = write(
            tmp.path(),
            "main.js",
            "import { count, inc } from './counter.js';\ninc();\nconsole.log(count);\n",
        );

        let out = link_entry(&entry).unwrap();
        assert!(!out.code.contains("const count"), "{}", out.code);
        assert!(out.code.contains("let count = 0;"), "{}", out.code);
    }

    #[test]
    fn differing_external_imports_of_one_name_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "view.js", "import { html } from 'lit';\nexport const view = () => html``;\n");
        let entry = write(
            tmp.path(),
            "main.js",
            "import { html, css } from 'lit';\nimport { view } from './view.js';\nview(html, css);\n",
        );

        let err = link_entry(&entry).unwrap_err();
        assert!(err.to_string().contains("top-level 'html' is also declared in ./view.js"), "{err}");
    }

    #[test]
    fn regex_literal_does_not_hide_a_later_import() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "util.js", "export const u = 1;\n");
        let entry = write(
            tmp.path(),
            "main.js",
            "const re = /a\\/*/;\nimport { u } from './util.js';\nconsole.log(re, u); /* end */\n",
        );

        let out = link_entry(&entry).unwrap();
        assert!(out.code.contains("// ./util.js\nconst u = 1;"), "{}", out.code);
        assert!(!out.code.contains("from './util.js'"), "{}", out.code);
    }

    #[test]
    fn url_references_are_collected_and_rewritten() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "pkg/app_bg.wasm", "\0asm");
        write(
            tmp.path(),
            "pkg/app.js",
            "export function wasmUrl() { return new URL('app_bg.wasm', import.meta.url); }\n",
        );
        let entry = write(tmp.path(), "main.js", "import { wasmUrl } from './pkg/app.js';\nwasmUrl();\n");

        let out = link_entry(&entry).unwrap();
        assert!(out.code.contains("new URL(\"app_bg.wasm\", import.meta.url)"), "{}", out.code);
        assert_eq!(out.assets.len(), 1);
        assert_eq!(out.assets[0].file_name, "app_bg.wasm");
    }

    #[test]
    fn missing_url_reference_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let entry = write(tmp.path(), "main.js", "fetch(new URL('gone.wasm', import.meta.url));");
        let err = link_entry(&entry).unwrap_err();
        assert!(err.to_string().contains("'gone.wasm' does not exist"), "{err}");
    }

    #[test]
    fn output_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.js", "export const a = 1;");
        write(tmp.path(), "b.js", "export * from './a.js';\nexport const b = 2;");
        let entry = write(tmp.path(), "main.js", "import * as lib from './b.js';\nexport { lib };");

        let first = link_entry(&entry).unwrap().code;
        let second = link_entry(&entry).unwrap().code;
        assert_eq!(first, second);
    }
}
