use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use wasmdist::config::ProjectFile;
use wasmdist::server::DevServerConfig;
use wasmdist::{BuildConfig, ErrorKind, Pipeline, Stage};

fn write(path: &Path, contents: impl AsRef<[u8]>) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// The layout of a wasm-pack project: glue in `target/`, page in `web/`.
fn sample_project(root: &Path) -> PathBuf {
    write(&root.join("target/wasm_bg.wasm"), b"\0asm\x01\0\0\0");
    write(
        &root.join("target/snippets/dom.js"),
        "export function mount(id) { return document.getElementById(id); }\n",
    );
    write(
        &root.join("target/wasm.js"),
        "import { mount } from './snippets/dom.js';\n\
         let wasm;\n\
         export function start() { mount('app'); return wasm; }\n\
         export default async function init() {\n  \
           const url = new URL('wasm_bg.wasm', import.meta.url);\n  \
           wasm = (await WebAssembly.instantiateStreaming(fetch(url))).instance.exports;\n\
         }\n",
    );
    write(&root.join("assets/a/x.txt"), "x");
    write(&root.join("assets/a/b/y.txt"), "y");
    write(&root.join("assets/favicon.ico"), [0u8, 0, 1, 0]);
    write(&root.join("web/index.html"), "<html><body></body></html>");
    root.join("web")
}

/// Relative path → contents for every file under `dir`.
fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(dir: &Path, base: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, base, out);
            } else {
                out.insert(path.strip_prefix(base).unwrap().to_path_buf(), fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(dir, dir, &mut out);
    out
}

#[test]
fn two_runs_produce_identical_trees() {
    let tmp = tempfile::tempdir().unwrap();
    let web = sample_project(tmp.path());
    let config = BuildConfig::with_defaults(&web).unwrap();

    Pipeline::new(config.clone()).run().unwrap();
    let first = snapshot(&config.output_dir);
    Pipeline::new(config.clone()).run().unwrap();
    let second = snapshot(&config.output_dir);

    assert_eq!(first, second);
    let names: Vec<_> = first.keys().map(|p| p.to_string_lossy().into_owned()).collect();
    assert_eq!(
        names,
        vec![
            "assets/a/b/y.txt",
            "assets/a/x.txt",
            "assets/favicon.ico",
            "index.html",
            "wasm.js",
            "wasm_bg.wasm",
        ]
    );
}

#[test]
fn build_output_has_expected_contents() {
    let tmp = tempfile::tempdir().unwrap();
    let web = sample_project(tmp.path());
    let config = BuildConfig::with_defaults(&web).unwrap();
    let dist = config.output_dir.clone();

    let result = Pipeline::new(config).run().unwrap();

    assert_eq!(
        fs::read_to_string(dist.join("index.html")).unwrap(),
        r#"<html><body><script type="module" src="wasm.js"></script></body></html>"#
    );
    assert_eq!(fs::read_to_string(dist.join("assets/a/x.txt")).unwrap(), "x");
    assert_eq!(fs::read_to_string(dist.join("assets/a/b/y.txt")).unwrap(), "y");
    assert_eq!(result.copied_assets.len(), 3);

    let bundle = fs::read_to_string(result.bundle_file).unwrap();
    let dom = bundle.find("// ./snippets/dom.js").unwrap();
    let main = bundle.find("// ./wasm.js").unwrap();
    assert!(dom < main, "{bundle}");
    assert!(bundle.contains("\nfunction mount(id)"), "{bundle}");
    assert!(bundle.contains("export default async function init()"), "{bundle}");
    assert!(!bundle.contains("from './snippets/dom.js'"), "{bundle}");
}

#[test]
fn stale_output_is_removed_by_the_next_run() {
    let tmp = tempfile::tempdir().unwrap();
    let web = sample_project(tmp.path());
    let config = BuildConfig::with_defaults(&web).unwrap();
    write(&config.output_dir.join("old/leftover.js"), "stale");

    Pipeline::new(config.clone()).run().unwrap();
    assert!(!config.output_dir.join("old").exists());
}

#[test]
fn missing_entry_fails_after_clean_without_outputs() {
    let tmp = tempfile::tempdir().unwrap();
    let web = sample_project(tmp.path());
    let config = BuildConfig::with_defaults(&web).unwrap();
    write(&config.output_dir.join("wasm.js"), "previous build");
    fs::remove_file(&config.entry_path).unwrap();

    let mut pipeline = Pipeline::new(config.clone());
    let err = pipeline.run().unwrap_err();

    assert_eq!(err.stage, Some(Stage::Bundling));
    assert!(matches!(err.kind, ErrorKind::Resolution { .. }), "{err}");
    assert_eq!(
        pipeline.history(),
        &[Stage::Idle, Stage::Cleaning, Stage::Bundling, Stage::Failed]
    );
    assert!(!config.output_dir.join("wasm.js").exists());
    assert!(!config.output_dir.join("index.html").exists());
    assert!(!config.output_dir.join("assets").exists());
}

#[test]
fn missing_asset_dir_is_not_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let web = sample_project(tmp.path());
    fs::remove_dir_all(tmp.path().join("assets")).unwrap();
    let config = BuildConfig::with_defaults(&web).unwrap();

    let result = Pipeline::new(config.clone()).run().unwrap();
    assert!(result.copied_assets.is_empty());
    assert!(!config.output_dir.join("assets").exists());
    assert!(result.html_file.exists());
}

#[test]
fn profiles_produce_distinct_layouts() {
    let tmp = tempfile::tempdir().unwrap();
    let web = sample_project(tmp.path());
    let file = ProjectFile::parse(
        r#"
        [build]
        script_loading = "module"

        [profile.release]
        asset_dest_subpath = "assets"

        [profile.dev]
        output_dir = "dev-dist"
        asset_dest_subpath = "."
        "#,
    )
    .unwrap();

    let release = file.build_config(Some("release"), &web).unwrap();
    let dev = file.build_config(Some("dev"), &web).unwrap();
    assert_ne!(release, dev);

    Pipeline::new(release.clone()).run().unwrap();
    Pipeline::new(dev.clone()).run().unwrap();
    assert!(release.output_dir.join("assets/a/x.txt").is_file());
    assert!(dev.output_dir.join("a/x.txt").is_file());
    assert!(!dev.output_dir.join("assets").exists());
}

#[test]
fn extra_copy_sets_resolve_conflicts_by_source_order() {
    let tmp = tempfile::tempdir().unwrap();
    let web = sample_project(tmp.path());
    write(&web.join("static/favicon.ico"), "from static");
    let file = ProjectFile::parse(
        r#"
        [build]
        asset_dest_subpath = "."

        [[build.copy]]
        from = "static"
        "#,
    )
    .unwrap();
    let config = file.build_config(None, &web).unwrap();

    Pipeline::new(config.clone()).run().unwrap();
    // `<root>/web/static` sorts after `<root>/assets`, so it wins.
    assert_eq!(
        fs::read_to_string(config.output_dir.join("favicon.ico")).unwrap(),
        "from static"
    );
}

#[test]
fn output_filename_with_separator_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let web = sample_project(tmp.path());
    let mut config = BuildConfig::with_defaults(&web).unwrap();
    config.output_filename = "js/wasm.js".into();

    let err = Pipeline::new(config).run().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Config(_)), "{err}");
}

#[test]
fn asset_source_enclosing_the_output_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let web = sample_project(tmp.path());
    let file = ProjectFile::parse(
        r#"
        [build]
        asset_source_dir = "."
        "#,
    )
    .unwrap();
    let config = file.build_config(None, &web).unwrap();

    let err = Pipeline::new(config.clone()).run().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Config(_)), "{err}");
    assert!(!config.output_dir.join("assets/dist").exists());
}

#[test]
fn dev_server_mapping_serves_live_assets_and_build_output() {
    let tmp = tempfile::tempdir().unwrap();
    let web = sample_project(tmp.path());
    let file = ProjectFile::default();
    let config = file.build_config(None, &web).unwrap();
    Pipeline::new(config.clone()).run().unwrap();

    let server = DevServerConfig::from_build(&config, &file.serve);
    let assets = tmp.path().join("assets").canonicalize().unwrap();
    let dist = config.output_dir.canonicalize().unwrap();

    assert_eq!(server.resolve("/assets/a/x.txt"), Some(assets.join("a/x.txt")));
    assert_eq!(server.resolve("/"), Some(dist.join("index.html")));
    assert_eq!(server.resolve("/wasm_bg.wasm"), Some(dist.join("wasm_bg.wasm")));
    assert_eq!(server.resolve("/assets/../web/index.html"), None);
}
