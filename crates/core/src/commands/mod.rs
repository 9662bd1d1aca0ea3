//! FTP commands
//!
//! One [`Command`] value per verb, parsed from a control-channel line.
//! Capability markers are plain predicates: `requires_login` gates
//! execution behind authentication, `interrupt_capable` marks the verbs
//! honored while a transfer is outstanding and `clears_interrupt` marks
//! the replies that end the interrupt window. Execution dispatches into
//! free functions grouped by command family.

mod auth;
mod connection;
mod files;
mod misc;
mod navigation;
mod transfer;

use std::sync::Arc;

use crate::fs::FsError;
use crate::reply::Reply;
use crate::session::Session;
use crate::state::FtpState;

/// A parsed control-channel command, carrying its raw parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    User(String),
    Pass(String),
    Pwd,
    Type(String),
    Mode(String),
    Stru(String),
    Noop,
    Syst,
    Allo,
    Feat,
    Tvfs,
    Port(String),
    Pasv,
    Eprt(String),
    Epsv(String),
    List(String),
    Nlst(String),
    Mlsd(String),
    Mlst(String),
    Cwd(String),
    Cdup,
    Retr(String),
    Stor(String),
    Appe(String),
    Stou(String),
    Rest(String),
    Mdtm(String),
    Size(String),
    Dele(String),
    Mkd(String),
    Rnfr(String),
    Rnto(String),
    Stat(String),
    Abor,
    Quit,

    /// Greeting dispatched when a connection is accepted
    Welcome,
    /// `421` + close, dispatched when the server is suspended or
    /// shutting down
    Unavailable,
    /// Verb not in the table
    Unknown(String),

    /// Data connection reported success
    TransferSuccess { filename: String },
    /// Data connection reported failure
    TransferFailed,
    /// Data connection reported a user-initiated abort
    TransferAborted,
}

impl Command {
    /// Parse one control line (CRLF already stripped) into a command
    pub fn parse(line: &str) -> Command {
        let line = line.trim_start();
        let (verb, param) = match line.split_once(' ') {
            Some((verb, param)) => (verb, param.trim()),
            None => (line.trim_end(), ""),
        };
        let param = param.to_string();

        match verb.to_ascii_uppercase().as_str() {
            "USER" => Command::User(param),
            "PASS" => Command::Pass(param),
            "PWD" => Command::Pwd,
            "TYPE" => Command::Type(param),
            "MODE" => Command::Mode(param),
            "STRU" => Command::Stru(param),
            "NOOP" => Command::Noop,
            "SYST" => Command::Syst,
            "ALLO" => Command::Allo,
            "FEAT" => Command::Feat,
            "TVFS" => Command::Tvfs,
            "PORT" => Command::Port(param),
            "PASV" => Command::Pasv,
            "EPRT" => Command::Eprt(param),
            "EPSV" => Command::Epsv(param),
            "LIST" => Command::List(param),
            "NLST" => Command::Nlst(param),
            "MLSD" => Command::Mlsd(param),
            "MLST" => Command::Mlst(param),
            "CWD" => Command::Cwd(param),
            "CDUP" => Command::Cdup,
            "RETR" => Command::Retr(param),
            "STOR" => Command::Stor(param),
            "APPE" => Command::Appe(param),
            "STOU" => Command::Stou(param),
            "REST" => Command::Rest(param),
            "MDTM" => Command::Mdtm(param),
            "SIZE" => Command::Size(param),
            "DELE" => Command::Dele(param),
            "MKD" => Command::Mkd(param),
            "RNFR" => Command::Rnfr(param),
            "RNTO" => Command::Rnto(param),
            "STAT" => Command::Stat(param),
            "ABOR" => Command::Abor,
            "QUIT" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }

    /// Canonical verb name, for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::User(_) => "USER",
            Command::Pass(_) => "PASS",
            Command::Pwd => "PWD",
            Command::Type(_) => "TYPE",
            Command::Mode(_) => "MODE",
            Command::Stru(_) => "STRU",
            Command::Noop => "NOOP",
            Command::Syst => "SYST",
            Command::Allo => "ALLO",
            Command::Feat => "FEAT",
            Command::Tvfs => "TVFS",
            Command::Port(_) => "PORT",
            Command::Pasv => "PASV",
            Command::Eprt(_) => "EPRT",
            Command::Epsv(_) => "EPSV",
            Command::List(_) => "LIST",
            Command::Nlst(_) => "NLST",
            Command::Mlsd(_) => "MLSD",
            Command::Mlst(_) => "MLST",
            Command::Cwd(_) => "CWD",
            Command::Cdup => "CDUP",
            Command::Retr(_) => "RETR",
            Command::Stor(_) => "STOR",
            Command::Appe(_) => "APPE",
            Command::Stou(_) => "STOU",
            Command::Rest(_) => "REST",
            Command::Mdtm(_) => "MDTM",
            Command::Size(_) => "SIZE",
            Command::Dele(_) => "DELE",
            Command::Mkd(_) => "MKD",
            Command::Rnfr(_) => "RNFR",
            Command::Rnto(_) => "RNTO",
            Command::Stat(_) => "STAT",
            Command::Abor => "ABOR",
            Command::Quit => "QUIT",
            Command::Welcome => "WELCOME",
            Command::Unavailable => "UNAVAILABLE",
            Command::Unknown(_) => "UNKNOWN",
            Command::TransferSuccess { .. } => "TRANSFER-SUCCESS",
            Command::TransferFailed => "TRANSFER-FAILED",
            Command::TransferAborted => "TRANSFER-ABORTED",
        }
    }

    /// Commands rejected with `530` unless the session is logged in
    pub fn requires_login(&self) -> bool {
        !matches!(
            self,
            Command::User(_)
                | Command::Pass(_)
                | Command::Quit
                | Command::Noop
                | Command::Syst
                | Command::Feat
                | Command::Welcome
                | Command::Unavailable
                | Command::Unknown(_)
                | Command::TransferSuccess { .. }
                | Command::TransferFailed
                | Command::TransferAborted
        )
    }

    /// Commands honored while a transfer is outstanding
    pub fn interrupt_capable(&self) -> bool {
        matches!(
            self,
            Command::Abor
                | Command::Stat(_)
                | Command::Quit
                | Command::TransferSuccess { .. }
                | Command::TransferFailed
                | Command::TransferAborted
        )
    }

    /// Commands whose reply ends the interrupt window
    pub fn clears_interrupt(&self) -> bool {
        matches!(
            self,
            Command::TransferSuccess { .. } | Command::TransferFailed | Command::TransferAborted
        )
    }

    /// Run the command against the session. Every failure mode comes
    /// back as a `Reply`; nothing escapes as an error.
    pub async fn execute(self, session: &mut Session, state: &Arc<FtpState>) -> Reply {
        match self {
            Command::User(param) => auth::user(session, state, param).await,
            Command::Pass(param) => auth::pass(session, state, param).await,
            Command::Quit => auth::quit(session),
            Command::Pwd => navigation::pwd(session),
            Command::Cwd(param) => navigation::cwd(session, state, param).await,
            Command::Cdup => navigation::cdup(session, state).await,
            Command::Type(param) => misc::type_(session, param),
            Command::Mode(param) => misc::mode(param),
            Command::Stru(param) => misc::stru(param),
            Command::Noop => misc::noop(),
            Command::Syst => misc::syst(state),
            Command::Allo => misc::allo(),
            Command::Feat => misc::feat(),
            Command::Tvfs => misc::tvfs(),
            Command::Welcome => misc::welcome(),
            Command::Unavailable => misc::unavailable(),
            Command::Unknown(_) => misc::unknown(),
            Command::Port(param) => connection::port(session, param),
            Command::Eprt(param) => connection::eprt(session, param),
            Command::Pasv => connection::pasv(session, state).await,
            Command::Epsv(param) => connection::epsv(session, state, param).await,
            Command::Abor => connection::abor(session),
            Command::Rest(param) => transfer::rest(session, state, param),
            Command::Retr(param) => transfer::retr(session, state, param).await,
            Command::Stor(param) => transfer::stor(session, state, param, false).await,
            Command::Appe(param) => transfer::stor(session, state, param, true).await,
            Command::Stou(param) => transfer::stou(session, state, param).await,
            Command::List(param) => transfer::list(session, state, param).await,
            Command::Nlst(param) => transfer::nlst(session, state, param).await,
            Command::Mlsd(param) => transfer::mlsd(session, state, param).await,
            Command::Dele(param) => files::dele(session, state, param).await,
            Command::Mkd(param) => files::mkd(session, state, param).await,
            Command::Rnfr(param) => files::rnfr(session, state, param).await,
            Command::Rnto(param) => files::rnto(session, state, param).await,
            Command::Mdtm(param) => files::mdtm(session, state, param).await,
            Command::Size(param) => files::size(session, state, param).await,
            Command::Mlst(param) => files::mlst(session, state, param).await,
            Command::Stat(param) => files::stat(session, state, param).await,
            Command::TransferSuccess { filename } => transfer::success(&filename),
            Command::TransferFailed => transfer::failed(),
            Command::TransferAborted => transfer::aborted(),
        }
    }
}

/// Double embedded quotes for `257`-style quoted paths
pub(crate) fn quote(path: &str) -> String {
    path.replace('"', "\"\"")
}

/// Map a filesystem failure onto its control-channel reply
pub(crate) fn fs_error_reply(err: FsError) -> Reply {
    Reply::new(err.reply_code(), err.message)
}

fn not_found(path: &str) -> Reply {
    Reply::new(550, format!("File \"{}\" not found.", quote(path)))
}

/// Stat a path, folding "missing" into the 550 reply
async fn require_entry(
    state: &Arc<FtpState>,
    path: &str,
) -> Result<crate::fs::ListingFile, Reply> {
    match state.filesystem.stat(path).await {
        Ok(Some(entry)) => Ok(entry),
        Ok(None) => Err(not_found(path)),
        Err(err) => Err(fs_error_reply(err)),
    }
}
