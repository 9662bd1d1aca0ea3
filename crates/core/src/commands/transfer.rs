//! Transfer-arming commands and transfer outcomes
//!
//! RETR/STOR/APPE/STOU and the listing commands only *arm* a transfer on
//! the session: they build the byte channel and return the preliminary
//! `150`. The control connection opens the data connection after that
//! reply has been flushed, which is what keeps the `150` ahead of the
//! final `226`/`426` on the wire.

use std::io::Cursor;
use std::sync::Arc;

use super::{fs_error_reply, not_found, quote, require_entry};
use crate::fs::{self, ListingFile};
use crate::listing;
use crate::reply::Reply;
use crate::session::{PendingTransfer, Session, TransferChannel, TransferMode};
use crate::state::FtpState;

fn no_opener() -> Reply {
    Reply::new(425, "Use PORT or PASV first.")
}

fn opening_reply(session: &Session, name: &str) -> Reply {
    Reply::new(
        150,
        format!(
            "Opening {} mode data connection for \"{}\".",
            session.data_type,
            quote(name)
        ),
    )
}

fn length_veto(session: &Session, verb: &str) -> Reply {
    Reply::new(
        550,
        format!(
            "{} unavailable for TYPE {}, MODE {}, STRU {}.",
            verb, session.data_type, session.data_mode, session.data_structure
        ),
    )
}

pub(super) fn rest(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    let marker: i64 = match param.parse() {
        Ok(value) if value >= 0 => value,
        _ => return Reply::new(501, "Give a byte offset."),
    };
    if state.filters.modifies_length(session.data_type) {
        return length_veto(session, "REST");
    }
    session.data_marker = marker;
    Reply::new(
        350,
        format!("Restarting at {}. Send STORE or RETRIEVE.", marker),
    )
}

pub(super) async fn retr(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    if param.is_empty() {
        return Reply::new(501, "Send a file name.");
    }
    let path = fs::resolve(&session.current_dir, &param);
    let entry = match require_entry(state, &path).await {
        Ok(entry) => entry,
        Err(reply) => return reply,
    };
    if entry.directory {
        return not_found(&path);
    }

    let marker = session.take_marker();
    let source = match state.filesystem.open_read(&path, marker).await {
        Ok(source) => source,
        Err(err) => return fs_error_reply(err),
    };
    if session.opener.is_none() {
        // Dropping the source closes the just-opened file
        return no_opener();
    }

    let source = state.filters.apply_read(session.data_type, source);
    let name = fs::base_name(&path).to_string();
    session.transfer = Some(PendingTransfer {
        mode: TransferMode::Retr,
        channel: TransferChannel::Read(source),
        filename: name.clone(),
    });
    opening_reply(session, &name)
}

pub(super) async fn stor(
    session: &mut Session,
    state: &Arc<FtpState>,
    param: String,
    append: bool,
) -> Reply {
    if param.is_empty() {
        return Reply::new(501, "Send a file name.");
    }
    if append && state.filters.modifies_length(session.data_type) {
        return length_veto(session, "APPE");
    }

    let path = fs::resolve(&session.current_dir, &param);
    let sink = match state.filesystem.open_write(&path, append).await {
        Ok(sink) => sink,
        Err(err) => return fs_error_reply(err),
    };
    if session.opener.is_none() {
        return no_opener();
    }

    let sink = state.filters.apply_write(session.data_type, sink);
    let name = fs::base_name(&path).to_string();
    session.transfer = Some(PendingTransfer {
        mode: TransferMode::Stor,
        channel: TransferChannel::Write(sink),
        filename: name.clone(),
    });
    opening_reply(session, &name)
}

pub(super) async fn stou(session: &mut Session, state: &Arc<FtpState>, _param: String) -> Reply {
    // Checked before creating anything so a refused STOU leaves no file
    if session.opener.is_none() {
        return no_opener();
    }

    let parent = session.current_dir.clone();
    let (name, sink) = match state.filesystem.create_unique(&parent).await {
        Ok(created) => created,
        Err(err) => return fs_error_reply(err),
    };

    let sink = state.filters.apply_write(session.data_type, sink);
    session.transfer = Some(PendingTransfer {
        mode: TransferMode::Stou,
        channel: TransferChannel::Write(sink),
        filename: name.clone(),
    });
    opening_reply(session, &name)
}

/// LIST/NLST/MLSD target: Unix-style flags and glob parameters fall back
/// to the current directory
fn listing_target(cwd: &str, param: &str) -> String {
    if param.is_empty() || param.starts_with('-') || param.contains('*') {
        cwd.to_string()
    } else {
        fs::resolve(cwd, param)
    }
}

async fn stat_listing_target(
    state: &Arc<FtpState>,
    target: &str,
) -> Result<ListingFile, Reply> {
    match state.filesystem.stat(target).await {
        Ok(Some(entry)) => Ok(entry),
        Ok(None) => Err(Reply::new(450, "No such file or directory.")),
        Err(err) => Err(fs_error_reply(err)),
    }
}

/// Wrap rendered listing bytes as the armed transfer
fn finish_listing(session: &mut Session, target: String, body: String) -> Reply {
    if session.opener.is_none() {
        return no_opener();
    }
    let source = Box::new(Cursor::new(body.into_bytes()));
    session.transfer = Some(PendingTransfer {
        mode: TransferMode::List,
        channel: TransferChannel::Read(source),
        filename: target.clone(),
    });
    opening_reply(session, &target)
}

pub(super) async fn list(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    let target = listing_target(&session.current_dir, &param);
    let entry = match stat_listing_target(state, &target).await {
        Ok(entry) => entry,
        Err(reply) => return reply,
    };

    let body = if entry.directory {
        match state.filesystem.list(&target).await {
            Ok(entries) => entries.iter().map(listing::list_line).collect(),
            Err(err) => return fs_error_reply(err),
        }
    } else {
        listing::list_line(&entry)
    };
    finish_listing(session, target, body)
}

pub(super) async fn nlst(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    let target = listing_target(&session.current_dir, &param);
    let entry = match stat_listing_target(state, &target).await {
        Ok(entry) => entry,
        Err(reply) => return reply,
    };

    let separator = state.filesystem.separator();
    let body = if entry.directory {
        match state.filesystem.list(&target).await {
            Ok(entries) => entries
                .iter()
                .map(|e| listing::nlst_line(e, separator))
                .collect(),
            Err(err) => return fs_error_reply(err),
        }
    } else {
        listing::nlst_line(&entry, separator)
    };
    finish_listing(session, target, body)
}

pub(super) async fn mlsd(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    let target = listing_target(&session.current_dir, &param);
    let current = match stat_listing_target(state, &target).await {
        Ok(entry) => entry,
        Err(reply) => return reply,
    };
    if !current.directory {
        return Reply::new(550, "Not a directory.");
    }

    let parent = match state.filesystem.stat(&fs::parent(&target)).await {
        Ok(Some(entry)) => entry,
        // The virtual root is its own parent
        _ => current.clone(),
    };
    let entries = match state.filesystem.list(&target).await {
        Ok(entries) => entries,
        Err(err) => return fs_error_reply(err),
    };

    let body = listing::mlsd_listing(&current, &parent, &entries);
    finish_listing(session, target, body)
}

pub(super) fn success(filename: &str) -> Reply {
    Reply::new(226, format!("Transfer completed for \"{}\".", quote(filename)))
}

pub(super) fn failed() -> Reply {
    Reply::new(426, "Connection closed, transfer failed.")
}

pub(super) fn aborted() -> Reply {
    Reply::new(426, "Connection closed, transfer aborted.")
        .with_next(Reply::new(226, "Abort command successful."))
}
