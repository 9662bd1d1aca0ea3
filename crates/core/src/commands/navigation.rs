//! PWD / CWD / CDUP

use std::sync::Arc;

use super::quote;
use crate::fs;
use crate::reply::Reply;
use crate::session::Session;
use crate::state::FtpState;

pub(super) fn pwd(session: &Session) -> Reply {
    Reply::new(
        257,
        format!("\"{}\" is current directory.", quote(&session.current_dir)),
    )
}

pub(super) async fn cwd(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    if param.is_empty() {
        return Reply::new(501, "Send a path.");
    }
    change_dir(session, state, &fs::resolve(&session.current_dir, &param)).await
}

pub(super) async fn cdup(session: &mut Session, state: &Arc<FtpState>) -> Reply {
    change_dir(session, state, &fs::parent(&session.current_dir)).await
}

async fn change_dir(session: &mut Session, state: &Arc<FtpState>, target: &str) -> Reply {
    match state.filesystem.stat(target).await {
        Ok(Some(entry)) if entry.directory => {
            session.current_dir = target.to_string();
            Reply::new(250, format!("Directory changed to \"{}\".", quote(target)))
        }
        Ok(_) => Reply::new(550, "No such directory."),
        Err(err) => super::fs_error_reply(err),
    }
}
