//! Pluggable filesystem abstraction
//!
//! Commands never touch the disk directly: they resolve virtual,
//! `/`-rooted paths against the session's current directory and hand them
//! to a [`FileSystem`] implementation. The shipped backend is
//! [`local::LocalFileSystem`]; alternative backends (object stores,
//! read-only bundles) implement the same trait.

pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

pub use local::LocalFileSystem;

/// Boxed byte source handed to a data connection
pub type FileSource = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Boxed byte sink handed to a data connection
pub type FileSink = Box<dyn AsyncWrite + Send + Sync + Unpin>;

/// Why a filesystem operation failed.
///
/// The kinds map onto control-channel reply codes, see
/// [`FsError::reply_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsErrorKind {
    NoPermissions,
    InvalidInput,
    PathError,
    SystemError,
    NotImplemented,
    Other,
}

/// A failed filesystem operation
#[derive(Debug, Error)]
#[error("{message}")]
pub struct FsError {
    /// Failure category
    pub kind: FsErrorKind,
    /// Human-readable detail, included in the reply text
    pub message: String,
}

impl FsError {
    pub fn new(kind: FsErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The control-channel reply code for this failure
    pub fn reply_code(&self) -> u16 {
        match self.kind {
            FsErrorKind::NoPermissions => 550,
            FsErrorKind::InvalidInput => 553,
            FsErrorKind::PathError => 450,
            FsErrorKind::SystemError => 451,
            FsErrorKind::NotImplemented => 504,
            FsErrorKind::Other => 450,
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let kind = match err.kind() {
            ErrorKind::PermissionDenied => FsErrorKind::NoPermissions,
            ErrorKind::NotFound => FsErrorKind::PathError,
            ErrorKind::InvalidInput => FsErrorKind::InvalidInput,
            ErrorKind::AlreadyExists => FsErrorKind::InvalidInput,
            _ => FsErrorKind::SystemError,
        };
        Self::new(kind, err.to_string())
    }
}

/// Metadata for one directory entry
#[derive(Debug, Clone)]
pub struct ListingFile {
    /// Entry name without any directory component
    pub name: String,

    /// Absolute virtual path
    pub path: String,

    /// Size in bytes (0 for directories)
    pub size: u64,

    /// Last modification time
    pub modified: DateTime<Utc>,

    /// Whether this entry is a directory
    pub directory: bool,

    /// Unix-style permission triplet, e.g. `rw-r--r--`
    pub permissions: String,

    /// Owner name reported in listings
    pub owner: String,
}

/// The narrow interface the FTP engine consumes.
///
/// All paths are absolute virtual paths (`/`-separated, `/`-rooted);
/// resolution against the session's current directory happens in
/// [`resolve`] before the backend is called.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Path separator the backend presents. Drives the SYST reply.
    fn separator(&self) -> char {
        '/'
    }

    /// Metadata for a path, or `None` when nothing exists there
    async fn stat(&self, path: &str) -> Result<Option<ListingFile>, FsError>;

    /// Directory contents, sorted by name
    async fn list(&self, path: &str) -> Result<Vec<ListingFile>, FsError>;

    /// Open a file for reading, positioned at `offset`
    async fn open_read(&self, path: &str, offset: u64) -> Result<FileSource, FsError>;

    /// Open a file for writing, truncating or appending
    async fn open_write(&self, path: &str, append: bool) -> Result<FileSink, FsError>;

    /// Create a uniquely named file under `parent` and open it for
    /// writing. Returns the chosen name together with the sink.
    async fn create_unique(&self, parent: &str) -> Result<(String, FileSink), FsError>;

    /// Remove a file or an empty directory
    async fn delete(&self, path: &str) -> Result<(), FsError>;

    /// Create a directory
    async fn mkdir(&self, path: &str) -> Result<(), FsError>;

    /// Rename `from` to `to`
    async fn rename(&self, from: &str, to: &str) -> Result<(), FsError>;
}

/// Normalize a virtual path: collapse `//`, resolve `.` and `..`.
/// `..` never escapes the root.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Resolve `param` against the current directory `cwd`
pub fn resolve(cwd: &str, param: &str) -> String {
    if param.starts_with('/') {
        normalize(param)
    } else {
        normalize(&format!("{}/{}", cwd, param))
    }
}

/// Parent directory of a virtual path (`/` is its own parent)
pub fn parent(path: &str) -> String {
    resolve(path, "..")
}

/// Final component of a virtual path
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("/")
}
