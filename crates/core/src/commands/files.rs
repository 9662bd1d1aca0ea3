//! File management and metadata: DELE / MKD / RNFR / RNTO / MDTM / SIZE /
//! MLST / STAT

use std::sync::Arc;

use super::{fs_error_reply, not_found, quote, require_entry};
use crate::fs;
use crate::listing::{self, MlsxKind};
use crate::reply::Reply;
use crate::session::Session;
use crate::state::FtpState;

pub(super) async fn dele(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    if param.is_empty() {
        return Reply::new(501, "Send a file name.");
    }
    let path = fs::resolve(&session.current_dir, &param);
    let entry = match require_entry(state, &path).await {
        Ok(entry) => entry,
        Err(reply) => return reply,
    };
    if entry.directory {
        return Reply::new(550, "Not a plain file.");
    }
    match state.filesystem.delete(&path).await {
        Ok(()) => Reply::new(250, "File deleted."),
        Err(err) => fs_error_reply(err),
    }
}

pub(super) async fn mkd(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    if param.is_empty() {
        return Reply::new(501, "Send a directory name.");
    }
    let path = fs::resolve(&session.current_dir, &param);
    match state.filesystem.mkdir(&path).await {
        Ok(()) => Reply::new(257, format!("\"{}\" directory created.", quote(&path))),
        Err(err) => fs_error_reply(err),
    }
}

pub(super) async fn rnfr(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    if param.is_empty() {
        return Reply::new(501, "Send a path.");
    }
    let path = fs::resolve(&session.current_dir, &param);
    if let Err(reply) = require_entry(state, &path).await {
        return reply;
    }
    session.rename_from = Some(path);
    Reply::new(350, "Requested file action pending further information.")
}

pub(super) async fn rnto(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    if param.is_empty() {
        return Reply::new(501, "Send a path.");
    }
    let from = match session.rename_from.take() {
        Some(from) => from,
        None => return Reply::new(503, "Send RNFR first."),
    };
    let to = fs::resolve(&session.current_dir, &param);
    match state.filesystem.rename(&from, &to).await {
        Ok(()) => Reply::new(250, "Rename successful."),
        Err(err) => fs_error_reply(err),
    }
}

pub(super) async fn mdtm(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    if param.is_empty() {
        return Reply::new(501, "Send a file name.");
    }
    let path = fs::resolve(&session.current_dir, &param);
    match require_entry(state, &path).await {
        Ok(entry) if entry.directory => not_found(&path),
        Ok(entry) => Reply::new(213, listing::timestamp(&entry.modified)),
        Err(reply) => reply,
    }
}

pub(super) async fn size(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    if param.is_empty() {
        return Reply::new(501, "Send a file name.");
    }
    if state.filters.modifies_length(session.data_type) {
        return Reply::new(
            550,
            format!(
                "SIZE unavailable for TYPE {}, MODE {}, STRU {}.",
                session.data_type, session.data_mode, session.data_structure
            ),
        );
    }
    let path = fs::resolve(&session.current_dir, &param);
    match require_entry(state, &path).await {
        Ok(entry) if entry.directory => not_found(&path),
        Ok(entry) => Reply::new(213, entry.size.to_string()),
        Err(reply) => reply,
    }
}

pub(super) async fn mlst(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    let path = if param.is_empty() {
        session.current_dir.clone()
    } else {
        fs::resolve(&session.current_dir, &param)
    };
    let entry = match require_entry(state, &path).await {
        Ok(entry) => entry,
        Err(reply) => return reply,
    };

    let fact_line = listing::mlsx_line(&entry, MlsxKind::Entry);
    Reply::new(
        250,
        format!("Listing {}\n{}\nEnd", path, fact_line.trim_end()),
    )
}

pub(super) async fn stat(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    if session.interrupt_state {
        return Reply::new(221, "Waiting for data transfer to finish.");
    }
    if param.is_empty() {
        return Reply::new(
            211,
            format!(
                "Control connection OK, TYPE {}, MODE {}, STRU {}",
                session.data_type, session.data_mode, session.data_structure
            ),
        );
    }

    let path = fs::resolve(&session.current_dir, &param);
    let entry = match state.filesystem.stat(&path).await {
        Ok(Some(entry)) => entry,
        Ok(None) => return Reply::new(450, "No such file or directory."),
        Err(err) => return fs_error_reply(err),
    };

    let lines = if entry.directory {
        match state.filesystem.list(&path).await {
            Ok(entries) => entries
                .iter()
                .map(|e| listing::list_line(e).trim_end().to_string())
                .collect::<Vec<_>>(),
            Err(err) => return fs_error_reply(err),
        }
    } else {
        vec![listing::list_line(&entry).trim_end().to_string()]
    };

    let mut body = format!("Status of \"{}\":", quote(&path));
    for line in lines {
        body.push('\n');
        body.push_str(&line);
    }
    body.push_str("\nEnd");
    Reply::new(212, body)
}
