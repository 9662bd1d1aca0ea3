//! USER / PASS / QUIT

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;

use crate::reply::Reply;
use crate::session::Session;
use crate::state::FtpState;

const GUEST_USER: &str = "anonymous";

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_\-.]+@[A-Za-z0-9_\-.]*$").expect("email regex is valid")
    })
}

pub(super) async fn user(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    if param.is_empty() {
        return Reply::new(501, "Send your user name.");
    }

    let is_guest = param.eq_ignore_ascii_case(GUEST_USER);
    session.username = Some(param);

    if is_guest {
        if state.config.guest {
            Reply::new(331, "Guest login ok, type your email address as password.")
        } else {
            Reply::new(332, "Need account for login.")
        }
    } else {
        Reply::new(331, "User name okay, need password.")
    }
}

pub(super) async fn pass(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    if session.logged_in {
        return Reply::new(503, "You are already logged in.");
    }
    let username = match session.username.clone() {
        Some(name) => name,
        None => return Reply::new(503, "Send your user name first."),
    };

    if username.eq_ignore_ascii_case(GUEST_USER) && state.config.guest {
        if !email_regex().is_match(&param) {
            return Reply::new(530, "Authentication failed.");
        }
        session.login(username.clone(), param, "/".to_string());
        tracing::info!(session_id = session.id, user = %username, "guest logged in");
        return Reply::new(230, "User logged in, proceed.");
    }

    if state.users.login(&username, &param).await {
        let home = state.users.home_dir(&username).unwrap_or_else(|| "/".to_string());
        session.login(username.clone(), param, home);
        tracing::info!(session_id = session.id, user = %username, "user logged in");
        Reply::new(230, "User logged in, proceed.")
    } else {
        tracing::warn!(session_id = session.id, user = %username, "login rejected");
        Reply::new(530, "Authentication failed.")
    }
}

pub(super) fn quit(session: &mut Session) -> Reply {
    session.poisoned = true;
    session.clear_opener();
    if session.has_live_transfer() || session.interrupt_state {
        Reply::new(221, "Goodbye, closing as soon as data transferred.")
    } else {
        Reply::new(221, "Goodbye.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_regex_shapes() {
        let re = email_regex();
        assert!(re.is_match("me@example.com"));
        assert!(re.is_match("first.last-1@"));
        assert!(!re.is_match("@example.com"));
        assert!(!re.is_match("no spaces@example.com"));
        assert!(!re.is_match("me"));
    }
}
