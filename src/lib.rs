pub mod assets;
pub mod bundle;
pub mod clean;
pub mod config;
pub mod error;
pub mod html;
pub mod lexer;
pub mod logger;
pub mod pipeline;
pub mod server;
pub mod token;
pub mod watch;

pub use config::BuildConfig;
pub use error::{BuildError, ErrorKind, Result};
pub use pipeline::{BuildResult, Pipeline, Stage};

/// Run a full build for `config`: clean, bundle, copy assets, inject the
/// template.
pub fn build(config: BuildConfig) -> Result<BuildResult> {
    Pipeline::new(config).run()
}
