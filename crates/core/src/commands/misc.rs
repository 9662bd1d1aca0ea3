//! Settings and constant-reply commands

use std::sync::Arc;

use crate::reply::Reply;
use crate::session::{DataType, Session};
use crate::state::FtpState;

pub(super) fn type_(session: &mut Session, param: String) -> Reply {
    if param.is_empty() {
        return Reply::new(501, "Send TYPE A or TYPE I.");
    }
    match param.to_ascii_uppercase().as_str() {
        "A" => {
            session.data_type = DataType::Ascii;
            Reply::new(200, "Type set to A")
        }
        "I" => {
            session.data_type = DataType::Image;
            Reply::new(200, "Type set to I")
        }
        _ => Reply::new(504, "Type not supported."),
    }
}

pub(super) fn mode(param: String) -> Reply {
    if param.is_empty() {
        return Reply::new(501, "Send MODE S.");
    }
    if param.eq_ignore_ascii_case("S") {
        Reply::new(200, "Mode set to S")
    } else {
        Reply::new(504, "Mode not supported.")
    }
}

pub(super) fn stru(param: String) -> Reply {
    if param.is_empty() {
        return Reply::new(501, "Send STRU F.");
    }
    if param.eq_ignore_ascii_case("F") {
        Reply::new(200, "Structure set to F")
    } else {
        Reply::new(504, "Structure not supported.")
    }
}

pub(super) fn noop() -> Reply {
    Reply::new(200, "NOOP command successful.")
}

pub(super) fn allo() -> Reply {
    Reply::new(202, "ALLO command ignored.")
}

pub(super) fn syst(state: &Arc<FtpState>) -> Reply {
    if state.filesystem.separator() == '\\' {
        Reply::new(215, "Windows_NT")
    } else {
        Reply::new(215, "UNIX Type: L8")
    }
}

pub(super) fn tvfs() -> Reply {
    Reply::new(200, "TVFS command successful.")
}

pub(super) fn feat() -> Reply {
    Reply::new(
        211,
        "Features:\nMDTM\nMLST type*;size*;modify*;perm*\nREST STREAM\nSIZE\nTVFS\nEPRT\nEPSV\nEnd",
    )
}

pub(super) fn welcome() -> Reply {
    Reply::new(220, "skiff FTP server ready.")
}

pub(super) fn unavailable() -> Reply {
    Reply::new(421, "Service not available, closing control connection.")
}

pub(super) fn unknown() -> Reply {
    Reply::new(504, "Not implemented.")
}
