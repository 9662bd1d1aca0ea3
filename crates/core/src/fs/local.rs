//! Local-disk filesystem backend
//!
//! Serves a directory tree rooted at the configured home directory.
//! Virtual paths are jailed to the root: they are normalized before this
//! backend sees them, so `..` can never climb out.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::OpenOptions;
use tokio::io::AsyncSeekExt;
use uuid::Uuid;

use super::{base_name, normalize, FileSink, FileSource, FileSystem, FsError, FsErrorKind, ListingFile};

const UNIQUE_NAME_ATTEMPTS: u32 = 8;

/// Filesystem backend over a local directory tree
pub struct LocalFileSystem {
    root: PathBuf,
    owner: String,
}

impl LocalFileSystem {
    /// Create a backend rooted at `root`. `owner` is the name reported
    /// in directory listings.
    pub fn new(root: impl Into<PathBuf>, owner: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            owner: owner.into(),
        }
    }

    /// Map a virtual path onto the real tree
    fn real_path(&self, virtual_path: &str) -> PathBuf {
        let clean = normalize(virtual_path);
        let mut path = self.root.clone();
        for part in clean.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    async fn entry(&self, virtual_path: &str, real: &Path) -> Result<Option<ListingFile>, FsError> {
        let meta = match tokio::fs::metadata(real).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let modified: DateTime<Utc> = meta
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());

        let virtual_path = normalize(virtual_path);
        Ok(Some(ListingFile {
            name: base_name(&virtual_path).to_string(),
            path: virtual_path,
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified,
            directory: meta.is_dir(),
            permissions: permission_string(&meta),
            owner: self.owner.clone(),
        }))
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    fn separator(&self) -> char {
        std::path::MAIN_SEPARATOR
    }

    async fn stat(&self, path: &str) -> Result<Option<ListingFile>, FsError> {
        let real = self.real_path(path);
        self.entry(path, &real).await
    }

    async fn list(&self, path: &str) -> Result<Vec<ListingFile>, FsError> {
        let real = self.real_path(path);
        let mut dir = tokio::fs::read_dir(&real).await.map_err(FsError::from)?;

        let base = normalize(path);
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(FsError::from)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let child = if base == "/" {
                format!("/{}", name)
            } else {
                format!("{}/{}", base, name)
            };
            if let Some(listing) = self.entry(&child, &entry.path()).await? {
                entries.push(listing);
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn open_read(&self, path: &str, offset: u64) -> Result<FileSource, FsError> {
        let real = self.real_path(path);
        let mut file = tokio::fs::File::open(&real).await.map_err(FsError::from)?;
        if offset > 0 {
            file.seek(std::io::SeekFrom::Start(offset))
                .await
                .map_err(FsError::from)?;
        }
        Ok(Box::new(file))
    }

    async fn open_write(&self, path: &str, append: bool) -> Result<FileSink, FsError> {
        let real = self.real_path(path);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(&real)
            .await
            .map_err(FsError::from)?;
        Ok(Box::new(file))
    }

    async fn create_unique(&self, parent: &str) -> Result<(String, FileSink), FsError> {
        let real_parent = self.real_path(parent);
        for _ in 0..UNIQUE_NAME_ATTEMPTS {
            let name = format!("stou_{}", &Uuid::new_v4().simple().to_string()[..12]);
            let candidate = real_parent.join(&name);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(file) => return Ok((name, Box::new(file))),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(FsError::new(
            FsErrorKind::SystemError,
            "could not allocate a unique name",
        ))
    }

    async fn delete(&self, path: &str) -> Result<(), FsError> {
        let real = self.real_path(path);
        let meta = tokio::fs::metadata(&real).await.map_err(FsError::from)?;
        if meta.is_dir() {
            tokio::fs::remove_dir(&real).await.map_err(FsError::from)
        } else {
            tokio::fs::remove_file(&real).await.map_err(FsError::from)
        }
    }

    async fn mkdir(&self, path: &str) -> Result<(), FsError> {
        let real = self.real_path(path);
        tokio::fs::create_dir(&real).await.map_err(FsError::from)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        let real_from = self.real_path(from);
        let real_to = self.real_path(to);
        tokio::fs::rename(&real_from, &real_to)
            .await
            .map_err(FsError::from)
    }
}

#[cfg(unix)]
fn permission_string(meta: &std::fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    let mode = meta.permissions().mode();
    let mut out = String::with_capacity(9);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

#[cfg(not(unix))]
fn permission_string(meta: &std::fs::Metadata) -> String {
    if meta.permissions().readonly() {
        "r--r--r--".to_string()
    } else {
        "rw-rw-rw-".to_string()
    }
}
