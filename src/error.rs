use std::io;
use std::path::{Path, PathBuf};

use crate::pipeline::Stage;

/// All errors produced by a wasmdist build.
#[derive(Debug, thiserror::Error)]
#[error("{}{kind}", stage_prefix(.stage))]
pub struct BuildError {
    pub kind: ErrorKind,
    /// Pipeline stage that was running when the error surfaced, if any.
    pub stage: Option<Stage>,
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Filesystem read, write or delete failure.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Copying a file failed; either side may be at fault.
    #[error("cannot copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A symbolic link leads back into a directory already being walked.
    #[error("symbolic link cycle at {}", .path.display())]
    CyclicLink { path: PathBuf },
    /// The entry module graph cannot be resolved.
    #[error("cannot resolve {}: {message}", .module.display())]
    Resolution { module: PathBuf, message: String },
    /// A required input path is missing.
    #[error("{} does not exist", .path.display())]
    NotFound { path: PathBuf },
    /// Malformed configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The dev server could not bind or start its workers.
    #[error("dev server: {0}")]
    Serve(String),
    /// The file watcher could not be set up.
    #[error("file watcher: {0}")]
    Watch(String),
}

fn stage_prefix(stage: &Option<Stage>) -> String {
    match stage {
        Some(stage) => format!("[{stage}] "),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;

/// Shorthand constructors.
impl BuildError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        ErrorKind::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
        .into()
    }

    pub fn copy(from: impl AsRef<Path>, to: impl AsRef<Path>, source: io::Error) -> Self {
        ErrorKind::Copy {
            from: from.as_ref().to_path_buf(),
            to: to.as_ref().to_path_buf(),
            source,
        }
        .into()
    }

    pub fn cyclic_link(path: impl AsRef<Path>) -> Self {
        ErrorKind::CyclicLink {
            path: path.as_ref().to_path_buf(),
        }
        .into()
    }

    pub fn resolution(module: impl AsRef<Path>, message: impl Into<String>) -> Self {
        ErrorKind::Resolution {
            module: module.as_ref().to_path_buf(),
            message: message.into(),
        }
        .into()
    }

    pub fn not_found(path: impl AsRef<Path>) -> Self {
        ErrorKind::NotFound {
            path: path.as_ref().to_path_buf(),
        }
        .into()
    }

    pub fn config(msg: impl Into<String>) -> Self {
        ErrorKind::Config(msg.into()).into()
    }

    pub fn serve(msg: impl Into<String>) -> Self {
        ErrorKind::Serve(msg.into()).into()
    }

    pub fn watch(msg: impl Into<String>) -> Self {
        ErrorKind::Watch(msg.into()).into()
    }

    /// Attach the stage name unless an inner stage already claimed the error.
    pub fn in_stage(mut self, stage: Stage) -> Self {
        self.stage.get_or_insert(stage);
        self
    }
}

impl From<ErrorKind> for BuildError {
    fn from(kind: ErrorKind) -> Self {
        Self { kind, stage: None }
    }
}

/// Map an `io::Result` into a `BuildError` that names the offending path.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| BuildError::io(path, e))
    }
}
