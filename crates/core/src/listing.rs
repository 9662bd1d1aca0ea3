//! Directory listing renderers
//!
//! Three formats share the [`crate::fs::ListingFile`] metadata: the
//! classic `ls -l` style used by LIST, bare names for NLST, and the
//! RFC 3659 fact lines used by MLSD/MLST.

use chrono::{DateTime, Utc};

use crate::fs::ListingFile;

/// Entry role in an MLSD listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MlsxKind {
    /// Regular entry; `type` derived from the metadata
    Entry,
    /// The listed directory itself
    CurrentDir,
    /// Parent of the listed directory
    ParentDir,
}

/// One `ls -l`-style LIST line, CRLF-terminated
pub fn list_line(file: &ListingFile) -> String {
    format!(
        "{}{} 1 {} {} {} {}\r\n",
        if file.directory { 'd' } else { '-' },
        file.permissions,
        file.owner,
        file.size,
        file.modified.format("%b %d %H:%M"),
        file.name,
    )
}

/// One NLST line: the bare name, directories with a trailing separator
pub fn nlst_line(file: &ListingFile, separator: char) -> String {
    if file.directory {
        format!("{}{}\r\n", file.name, separator)
    } else {
        format!("{}\r\n", file.name)
    }
}

/// `modify` fact / MDTM timestamp: `yyyyMMddHHmmss` in UTC
pub fn timestamp(when: &DateTime<Utc>) -> String {
    when.format("%Y%m%d%H%M%S").to_string()
}

/// One MLSD/MLST fact line: `fact=value;...; path`, CRLF-terminated
pub fn mlsx_line(file: &ListingFile, kind: MlsxKind) -> String {
    let entry_type = match kind {
        MlsxKind::CurrentDir => "cdir",
        MlsxKind::ParentDir => "pdir",
        MlsxKind::Entry if file.directory => "dir",
        MlsxKind::Entry => "file",
    };
    let perm = if file.directory { "el" } else { "rw" };
    let name = match kind {
        MlsxKind::Entry => file.name.as_str(),
        _ => file.path.as_str(),
    };
    format!(
        "type={};size={};modify={};perm={}; {}\r\n",
        entry_type,
        file.size,
        timestamp(&file.modified),
        perm,
        name,
    )
}

/// Full MLSD body: cdir line, pdir line, then one line per entry
pub fn mlsd_listing(
    current: &ListingFile,
    parent: &ListingFile,
    entries: &[ListingFile],
) -> String {
    let mut out = String::new();
    out.push_str(&mlsx_line(current, MlsxKind::CurrentDir));
    out.push_str(&mlsx_line(parent, MlsxKind::ParentDir));
    for entry in entries {
        out.push_str(&mlsx_line(entry, MlsxKind::Entry));
    }
    out
}
