//! Content types for served files.

use std::path::Path;

pub mod types {
    pub const HTML: &str = "text/html; charset=utf-8";
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const CSS: &str = "text/css; charset=utf-8";
    pub const JAVASCRIPT: &str = "text/javascript; charset=utf-8";
    pub const JSON: &str = "application/json";
    pub const WASM: &str = "application/wasm";
    pub const OCTET_STREAM: &str = "application/octet-stream";

    pub const PNG: &str = "image/png";
    pub const JPEG: &str = "image/jpeg";
    pub const GIF: &str = "image/gif";
    pub const WEBP: &str = "image/webp";
    pub const SVG: &str = "image/svg+xml";
    pub const ICO: &str = "image/x-icon";

    pub const MP3: &str = "audio/mpeg";
    pub const WAV: &str = "audio/wav";
    pub const OGG: &str = "audio/ogg";
    pub const MP4: &str = "video/mp4";
    pub const WEBM: &str = "video/webm";

    pub const WOFF: &str = "font/woff";
    pub const WOFF2: &str = "font/woff2";
    pub const TTF: &str = "font/ttf";
    pub const OTF: &str = "font/otf";
}

/// Guess the content type from a file extension.
pub fn from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => types::HTML,
        Some("txt" | "md") => types::PLAIN,
        Some("css") => types::CSS,
        Some("js" | "mjs") => types::JAVASCRIPT,
        Some("json" | "map") => types::JSON,
        Some("wasm") => types::WASM,

        Some("png") => types::PNG,
        Some("jpg" | "jpeg") => types::JPEG,
        Some("gif") => types::GIF,
        Some("webp") => types::WEBP,
        Some("svg") => types::SVG,
        Some("ico") => types::ICO,

        Some("mp3") => types::MP3,
        Some("wav") => types::WAV,
        Some("ogg" | "oga") => types::OGG,
        Some("mp4") => types::MP4,
        Some("webm") => types::WEBM,

        Some("woff") => types::WOFF,
        Some("woff2") => types::WOFF2,
        Some("ttf") => types::TTF,
        Some("otf") => types::OTF,

        _ => types::OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wasm_is_served_as_application_wasm() {
        assert_eq!(from_path(Path::new("dist/app_bg.wasm")), "application/wasm");
        assert_eq!(from_path(Path::new("dist/APP.WASM")), "application/wasm");
    }

    #[test]
    fn common_web_types() {
        assert_eq!(from_path(Path::new("index.html")), types::HTML);
        assert_eq!(from_path(Path::new("wasm.js")), types::JAVASCRIPT);
        assert_eq!(from_path(Path::new("a/b/logo.svg")), types::SVG);
        assert_eq!(from_path(Path::new("LICENSE")), types::OCTET_STREAM);
    }
}
