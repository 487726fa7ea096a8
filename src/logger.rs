//! Terminal logging with colored module prefixes.
//!
//! ```ignore
//! log!("copy"; "{} files -> {}", count, dest.display());
//! debug!("link"; "hoisting {}", module.display());
//! ```
//!
//! Everything goes to stderr so `build --json` can own stdout.

use std::io::{stderr, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use owo_colors::{OwoColorize, Stream};

/// Global verbose flag (set by `--verbose`).
static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

/// Log a message with a colored module prefix.
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Log a message only when `--verbose` is enabled.
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

pub fn log(module: &str, message: &str) {
    let prefix = colorize_prefix(module);
    let mut err = stderr().lock();
    writeln!(err, "{prefix} {message}").ok();
}

fn colorize_prefix(module: &str) -> String {
    let prefix = format!("[{module}]");
    match module {
        "error" | "failed" => prefix
            .if_supports_color(Stream::Stderr, |p| p.bright_red().bold().to_string())
            .to_string(),
        "serve" => prefix
            .if_supports_color(Stream::Stderr, |p| p.bright_blue().bold().to_string())
            .to_string(),
        "watch" => prefix
            .if_supports_color(Stream::Stderr, |p| p.bright_green().bold().to_string())
            .to_string(),
        "done" => prefix
            .if_supports_color(Stream::Stderr, |p| p.green().bold().to_string())
            .to_string(),
        _ => prefix
            .if_supports_color(Stream::Stderr, |p| p.bright_yellow().bold().to_string())
            .to_string(),
    }
}
