//! Per-connection session state
//!
//! A [`Session`] is exclusively owned by the control-connection task that
//! created it. Other components never hold a reference to it; data
//! connections receive the bits they need (stats handle, event sender)
//! by value and report back over the session's event channel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::fs::{FileSink, FileSource};
use crate::passive::PassiveReservation;

/// TYPE setting: ASCII or image (binary)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Ascii,
    Image,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Ascii => write!(f, "A"),
            DataType::Image => write!(f, "I"),
        }
    }
}

/// MODE setting. Only stream mode is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    Stream,
}

impl std::fmt::Display for DataMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S")
    }
}

/// STRU setting. Only file structure is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStructure {
    File,
}

impl std::fmt::Display for DataStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "F")
    }
}

/// Which command armed the pending transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Retr,
    Stor,
    Stou,
    List,
}

impl TransferMode {
    /// Whether bytes flow from the server to the client
    pub fn is_outbound(&self) -> bool {
        matches!(self, TransferMode::Retr | TransferMode::List)
    }
}

/// The byte channel a data connection pipes into or out of
pub enum TransferChannel {
    /// Server-to-client source (RETR, listings)
    Read(FileSource),
    /// Client-to-server sink (STOR, APPE, STOU)
    Write(FileSink),
}

/// A transfer armed by a command, waiting for its data connection.
///
/// The arming command only builds this; the control connection opens the
/// data connection after the preliminary `150` has been flushed.
pub struct PendingTransfer {
    pub mode: TransferMode,
    pub channel: TransferChannel,
    /// Name reported in the final `226`
    pub filename: String,
}

/// How the next data connection will be established
pub enum DataOpener {
    /// No opener armed; transfer commands answer `425`
    None,
    /// Server listens: a passive reservation is armed and must be
    /// consumed exactly once
    Passive(PassiveReservation),
    /// Client listens: dial this endpoint at transfer start
    Active(SocketAddr),
}

impl DataOpener {
    pub fn is_none(&self) -> bool {
        matches!(self, DataOpener::None)
    }
}

/// Byte counters for one session, shared with its data connections
#[derive(Default)]
pub struct SessionStats {
    uploaded: AtomicU64,
    downloaded: AtomicU64,
}

impl SessionStats {
    pub fn add_uploaded(&self, bytes: u64) {
        self.uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_downloaded(&self, bytes: u64) {
        self.downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }
}

/// Mutable state for one control connection
pub struct Session {
    /// Process-unique session id
    pub id: u64,

    /// Client address of the control connection
    pub remote: SocketAddr,

    /// Server-side address of the control connection. PASV advertises
    /// this IP when no external address is configured.
    pub local: SocketAddr,

    /// When the control connection was accepted
    pub created_at: DateTime<Utc>,

    pub username: Option<String>,
    pub password: Option<String>,
    pub logged_in: bool,

    /// Whether anonymous logins are allowed for this session
    pub guest: bool,

    /// Current virtual directory, `/`-rooted
    pub current_dir: String,

    pub data_type: DataType,
    pub data_mode: DataMode,
    pub data_structure: DataStructure,

    /// How the next data connection will be opened
    pub opener: DataOpener,

    /// Transfer armed by the last transfer command, if any
    pub transfer: Option<PendingTransfer>,

    /// REST offset for the next RETR/STOR; one-shot
    pub data_marker: i64,

    /// Abort handle of the live data connection, if one is running
    pub data_abort: Option<oneshot::Sender<()>>,

    /// Source path stashed by RNFR, consumed by RNTO
    pub rename_from: Option<String>,

    /// On while a preliminary `1xx` is outstanding. Only ABOR/STAT/QUIT
    /// are dispatched until the transfer outcome clears it.
    pub interrupt_state: bool,

    /// QUIT received; close the control connection as soon as idle
    pub poisoned: bool,

    /// Byte counters shared with data connections
    pub stats: Arc<SessionStats>,
}

impl Session {
    pub fn new(id: u64, remote: SocketAddr, local: SocketAddr, guest: bool) -> Self {
        Self {
            id,
            remote,
            local,
            created_at: Utc::now(),
            username: None,
            password: None,
            logged_in: false,
            guest,
            current_dir: "/".to_string(),
            data_type: DataType::Image,
            data_mode: DataMode::Stream,
            data_structure: DataStructure::File,
            opener: DataOpener::None,
            transfer: None,
            data_marker: 0,
            data_abort: None,
            rename_from: None,
            interrupt_state: false,
            poisoned: false,
            stats: Arc::new(SessionStats::default()),
        }
    }

    /// Complete a login: record credentials and land in `home`
    pub fn login(&mut self, username: String, password: String, home: String) {
        self.username = Some(username);
        self.password = Some(password);
        self.logged_in = true;
        self.current_dir = crate::fs::normalize(&home);
    }

    /// Whether a data connection is currently running
    pub fn has_live_transfer(&self) -> bool {
        self.data_abort.is_some()
    }

    /// Consume the REST marker (cleared after use)
    pub fn take_marker(&mut self) -> u64 {
        let marker = self.data_marker.max(0) as u64;
        self.data_marker = 0;
        marker
    }

    /// Drop any armed opener, cancelling a pending passive reservation
    pub fn clear_opener(&mut self) {
        self.opener = DataOpener::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            7,
            "198.51.100.4:52100".parse().unwrap(),
            "127.0.0.1:2021".parse().unwrap(),
            true,
        )
    }

    #[test]
    fn test_new_session_defaults() {
        let session = session();
        assert!(!session.logged_in);
        assert_eq!(session.current_dir, "/");
        assert_eq!(session.data_type, DataType::Image);
        assert!(session.opener.is_none());
        assert!(!session.has_live_transfer());
    }

    #[test]
    fn test_login_sets_home() {
        let mut session = session();
        session.login("alice".into(), "secret".into(), "/alice/".into());
        assert!(session.logged_in);
        assert_eq!(session.username.as_deref(), Some("alice"));
        assert_eq!(session.current_dir, "/alice");
    }

    #[test]
    fn test_marker_is_one_shot() {
        let mut session = session();
        session.data_marker = 100;
        assert_eq!(session.take_marker(), 100);
        assert_eq!(session.take_marker(), 0);
    }

    #[test]
    fn test_stats_counters() {
        let stats = SessionStats::default();
        stats.add_uploaded(10);
        stats.add_uploaded(5);
        stats.add_downloaded(7);
        assert_eq!(stats.uploaded(), 15);
        assert_eq!(stats.downloaded(), 7);
    }

    #[test]
    fn test_type_letters() {
        assert_eq!(DataType::Ascii.to_string(), "A");
        assert_eq!(DataType::Image.to_string(), "I");
        assert_eq!(DataMode::Stream.to_string(), "S");
        assert_eq!(DataStructure::File.to_string(), "F");
    }
}
