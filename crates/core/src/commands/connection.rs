//! Data-connection management: PORT / EPRT / PASV / EPSV / ABOR

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::reply::Reply;
use crate::session::{DataOpener, Session};
use crate::state::FtpState;

/// How long PASV/EPSV wait for a pool reservation
const RESERVE_DEADLINE: Duration = Duration::from_secs(1);

/// Parse `h1,h2,h3,h4,p1,p2` into a socket address
fn parse_port_param(param: &str) -> Option<SocketAddr> {
    let mut parts = [0u8; 6];
    let mut count = 0;
    for piece in param.split(',') {
        if count == 6 {
            return None;
        }
        parts[count] = piece.trim().parse().ok()?;
        count += 1;
    }
    if count != 6 {
        return None;
    }
    let ip = Ipv4Addr::new(parts[0], parts[1], parts[2], parts[3]);
    let port = u16::from(parts[4]) * 256 + u16::from(parts[5]);
    Some(SocketAddr::new(IpAddr::V4(ip), port))
}

/// Parse `<d>proto<d>addr<d>port<d>`, validating the address literal
/// against the protocol family
fn parse_eprt_param(param: &str) -> Result<SocketAddr, Reply> {
    let bad = || Reply::new(501, "Illegal EPRT command.");

    let delim = param.chars().next().ok_or_else(bad)?;
    let fields: Vec<&str> = param.split(delim).collect();
    if fields.len() != 5 || !fields[0].is_empty() || !fields[4].is_empty() {
        return Err(bad());
    }

    let addr: IpAddr = fields[2].parse().map_err(|_| bad())?;
    let port: u16 = fields[3].parse().map_err(|_| bad())?;
    let family_ok = match fields[1] {
        "1" => addr.is_ipv4(),
        "2" => addr.is_ipv6(),
        _ => {
            return Err(Reply::new(
                522,
                "Network protocol not supported, use (1,2).",
            ))
        }
    };
    if !family_ok {
        return Err(bad());
    }
    Ok(SocketAddr::new(addr, port))
}

pub(super) fn port(session: &mut Session, param: String) -> Reply {
    match parse_port_param(&param) {
        Some(endpoint) => {
            session.clear_opener();
            session.opener = DataOpener::Active(endpoint);
            Reply::new(200, "PORT command successful.")
        }
        None => Reply::new(501, "Illegal PORT command."),
    }
}

pub(super) fn eprt(session: &mut Session, param: String) -> Reply {
    match parse_eprt_param(&param) {
        Ok(endpoint) => {
            session.clear_opener();
            session.opener = DataOpener::Active(endpoint);
            Reply::new(200, "EPRT command successful.")
        }
        Err(reply) => reply,
    }
}

pub(super) async fn pasv(session: &mut Session, state: &Arc<FtpState>) -> Reply {
    match reserve(session, state).await {
        Some(port) => {
            let ip = advertised_ip(session, state);
            let octets = ip.octets();
            Reply::new(
                227,
                format!(
                    "Entering Passive Mode ({},{},{},{},{},{})",
                    octets[0],
                    octets[1],
                    octets[2],
                    octets[3],
                    port >> 8,
                    port & 0xff
                ),
            )
        }
        None => Reply::new(425, "Can't open data connection."),
    }
}

pub(super) async fn epsv(session: &mut Session, state: &Arc<FtpState>, param: String) -> Reply {
    if param.eq_ignore_ascii_case("ALL") {
        return Reply::new(200, "EPSV ALL command successful.");
    }
    if !param.is_empty() && param != "1" && param != "2" {
        return Reply::new(522, "Network protocol not supported, use (1,2).");
    }

    match reserve(session, state).await {
        Some(port) => Reply::new(
            229,
            format!("Entering Extended Passive Mode (|||{}|)", port),
        ),
        None => Reply::new(425, "Can't open data connection."),
    }
}

/// Arm a passive reservation on the session, returning the bound port
async fn reserve(session: &mut Session, state: &Arc<FtpState>) -> Option<u16> {
    // Re-arming drops any previous reservation first
    session.clear_opener();

    let reservation =
        match tokio::time::timeout(RESERVE_DEADLINE, state.passive.reserve(session.id)).await {
            Err(_) => {
                tracing::warn!(session_id = session.id, "passive reservation timed out");
                return None;
            }
            Ok(Err(e)) => {
                tracing::warn!(session_id = session.id, error = %e, "passive reservation failed");
                return None;
            }
            Ok(Ok(reservation)) => reservation,
        };

    let port = reservation.addr().port();
    session.opener = DataOpener::Passive(reservation);
    Some(port)
}

fn advertised_ip(session: &Session, state: &Arc<FtpState>) -> Ipv4Addr {
    if let Some(external) = state.config.external_ip {
        return external;
    }
    match session.local.ip() {
        IpAddr::V4(ip) => ip,
        IpAddr::V6(_) => Ipv4Addr::LOCALHOST,
    }
}

pub(super) fn abor(session: &mut Session) -> Reply {
    session.clear_opener();
    if let Some(abort) = session.data_abort.take() {
        // The data connection's Aborted report produces the 426 + 226
        let _ = abort.send(());
        Reply::none()
    } else {
        Reply::new(226, "Abort command successful.")
    }
}
