//! HTML template injector.
//!
//! Adds a `<script>` reference to the bundle into the page shell. The
//! template is handled as bytes, so encoding and everything outside the
//! insertion point are preserved exactly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{ScriptLoading, BUNDLE_MARKER};
use crate::debug;
use crate::error::{BuildError, IoContext, Result};

/// Inject a module script tag for `bundle_filename` into the template and
/// write it to `output_dir/<template file name>`.
pub fn inject_and_write(template_path: &Path, bundle_filename: &str, output_dir: &Path) -> Result<PathBuf> {
    inject_and_write_with(template_path, bundle_filename, output_dir, ScriptLoading::Module)
}

/// [`inject_and_write`] with an explicit script loading mode.
pub fn inject_and_write_with(
    template_path: &Path,
    bundle_filename: &str,
    output_dir: &Path,
    loading: ScriptLoading,
) -> Result<PathBuf> {
    let template = match fs::read(template_path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(BuildError::not_found(template_path));
        }
        Err(e) => return Err(BuildError::io(template_path, e)),
    };
    let file_name = template_path
        .file_name()
        .ok_or_else(|| BuildError::config(format!("{} has no file name", template_path.display())))?;

    let tag = script_tag(bundle_filename, loading);
    let (page, point) = inject(&template, &tag);
    debug!("html"; "script inserted {point}");

    fs::create_dir_all(output_dir).at(output_dir)?;
    let html_path = output_dir.join(file_name);
    fs::write(&html_path, page).at(&html_path)?;
    Ok(html_path)
}

/// The tag referencing the bundle.
pub fn script_tag(bundle_filename: &str, loading: ScriptLoading) -> String {
    let src = escape_attr(bundle_filename);
    match loading {
        ScriptLoading::Module => format!(r#"<script type="module" src="{src}"></script>"#),
        ScriptLoading::Defer => format!(r#"<script defer src="{src}"></script>"#),
        ScriptLoading::Blocking => format!(r#"<script src="{src}"></script>"#),
    }
}

/// Where the tag went, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionPoint {
    Marker,
    BeforeBody,
    BeforeHtml,
    Appended,
}

impl std::fmt::Display for InsertionPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            InsertionPoint::Marker => "at marker",
            InsertionPoint::BeforeBody => "before </body>",
            InsertionPoint::BeforeHtml => "before </html>",
            InsertionPoint::Appended => "at end of file",
        })
    }
}

/// Insert `tag` into `template`.
///
/// Preference order: replace the marker comment, else before the last
/// `</body>`, else before the last `</html>`, else append.
pub fn inject(template: &[u8], tag: &str) -> (Vec<u8>, InsertionPoint) {
    let tag = tag.as_bytes();

    if let Some(pos) = find(template, BUNDLE_MARKER.as_bytes()) {
        return (
            splice(template, pos..pos + BUNDLE_MARKER.len(), tag),
            InsertionPoint::Marker,
        );
    }
    if let Some(pos) = rfind_ignore_case(template, b"</body>") {
        return (splice(template, pos..pos, tag), InsertionPoint::BeforeBody);
    }
    if let Some(pos) = rfind_ignore_case(template, b"</html>") {
        return (splice(template, pos..pos, tag), InsertionPoint::BeforeHtml);
    }

    let mut page = Vec::with_capacity(template.len() + tag.len() + 1);
    page.extend_from_slice(template);
    if !template.is_empty() && !template.ends_with(b"\n") {
        page.push(b'\n');
    }
    page.extend_from_slice(tag);
    (page, InsertionPoint::Appended)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind_ignore_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|w| w.eq_ignore_ascii_case(needle))
}

fn splice(template: &[u8], range: std::ops::Range<usize>, insert: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(template.len() + insert.len());
    out.extend_from_slice(&template[..range.start]);
    out.extend_from_slice(insert);
    out.extend_from_slice(&template[range.end..]);
    out
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const TAG: &str = r#"<script type="module" src="wasm.js"></script>"#;

    fn inject_str(template: &str) -> (String, InsertionPoint) {
        let (bytes, point) = inject(template.as_bytes(), TAG);
        (String::from_utf8(bytes).unwrap(), point)
    }

    #[test]
    fn minimal_page_gets_tag_before_body_close() {
        let (page, point) = inject_str("<html><body></body></html>");
        assert_eq!(
            page,
            r#"<html><body><script type="module" src="wasm.js"></script></body></html>"#
        );
        assert_eq!(point, InsertionPoint::BeforeBody);
    }

    #[test]
    fn marker_is_replaced() {
        let (page, point) =
            inject_str("<head><!-- wasmdist:bundle --></head><body><p>hi</p></body>");
        assert_eq!(
            page,
            r#"<head><script type="module" src="wasm.js"></script></head><body><p>hi</p></body>"#
        );
        assert_eq!(point, InsertionPoint::Marker);
    }

    #[test]
    fn last_body_close_wins_case_insensitively() {
        let (page, _) = inject_str("<BODY><pre>&lt;/body&gt; </body></pre></BODY>");
        assert!(page.ends_with(&format!("{TAG}</BODY>")), "{page}");
    }

    #[test]
    fn falls_back_to_html_close_then_append() {
        let (page, point) = inject_str("<html><p>x</p></html>");
        assert_eq!(point, InsertionPoint::BeforeHtml);
        assert_eq!(page, format!("<html><p>x</p>{TAG}</html>"));

        let (page, point) = inject_str("<p>fragment</p>");
        assert_eq!(point, InsertionPoint::Appended);
        assert_eq!(page, format!("<p>fragment</p>\n{TAG}"));
    }

    #[test]
    fn non_utf8_bytes_survive() {
        let template = b"<body>\xff\xfe</body>".to_vec();
        let (page, _) = inject(&template, TAG);
        assert!(page.starts_with(b"<body>\xff\xfe<script"));
    }

    #[test]
    fn script_loading_variants() {
        assert_eq!(script_tag("a.js", ScriptLoading::Defer), r#"<script defer src="a.js"></script>"#);
        assert_eq!(script_tag("a.js", ScriptLoading::Blocking), r#"<script src="a.js"></script>"#);
        assert_eq!(
            script_tag("a\"b.js", ScriptLoading::Module),
            r#"<script type="module" src="a&quot;b.js"></script>"#
        );
    }

    #[test]
    fn writes_under_template_file_name() {
        let tmp = tempfile::tempdir().unwrap();
        let template = tmp.path().join("shell.html");
        fs::write(&template, "<html><body></body></html>").unwrap();
        let out = tmp.path().join("dist");

        let written = inject_and_write(&template, "wasm.js", &out).unwrap();
        assert_eq!(written, out.join("shell.html"));
        assert!(fs::read_to_string(&written).unwrap().contains(TAG));
    }

    #[test]
    fn missing_template_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = inject_and_write(&tmp.path().join("index.html"), "wasm.js", tmp.path()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::NotFound { .. }), "{err}");
    }
}
