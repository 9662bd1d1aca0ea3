//! Data connections
//!
//! One task per transfer. The task first obtains its socket (accepting
//! the armed passive reservation or dialing the client's PORT endpoint),
//! then pumps bytes between the socket and the transfer channel, and
//! finally reports exactly one [`TransferOutcome`] to the owning control
//! connection. The control task never blocks on any of this.
//!
//! Backpressure on the outbound path is the `write_all` + `flush` pair:
//! the pump does not read the next chunk until the OS has taken the
//! previous one. An abort (ABOR, or the control connection going away)
//! resolves the abort receiver and short-circuits both phases.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::passive::{PassiveError, PassiveReservation};
use crate::registry::Registry;
use crate::session::{PendingTransfer, SessionStats, TransferChannel, TransferMode};

/// Pump buffer size
const DATA_BUFFER_SIZE: usize = 8 * 1024;

/// How a transfer ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    Failed,
    Aborted,
}

/// Report sent to the control connection when a data connection stops
#[derive(Debug)]
pub struct TransferOutcome {
    pub kind: OutcomeKind,
    pub mode: TransferMode,
    /// Name reported in the final reply
    pub filename: String,
    /// Bytes moved before the connection stopped
    pub bytes: u64,
}

/// Where the data socket comes from
pub enum DataSource {
    /// Consume the armed passive reservation
    Passive(PassiveReservation),
    /// Dial the client's PORT/EPRT endpoint
    Active(SocketAddr),
}

#[derive(Debug, Error)]
enum EstablishError {
    #[error(transparent)]
    Passive(#[from] PassiveError),

    #[error("Failed to connect to client: {0}")]
    Dial(std::io::Error),

    #[error("Client endpoint did not answer in time")]
    DialTimeout,
}

/// Spawn the data-connection task for an armed transfer.
///
/// Must only be called after the preliminary `150` has been flushed to
/// the control socket, so the client never sees the final reply first.
#[allow(clippy::too_many_arguments)]
pub fn spawn(
    session_id: u64,
    source: DataSource,
    transfer: PendingTransfer,
    stats: Arc<SessionStats>,
    registry: Arc<Registry>,
    events: mpsc::Sender<TransferOutcome>,
    abort_rx: oneshot::Receiver<()>,
    connect_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(run(
        session_id,
        source,
        transfer,
        stats,
        registry,
        events,
        abort_rx,
        connect_timeout,
    ))
}

#[allow(clippy::too_many_arguments)]
async fn run(
    session_id: u64,
    source: DataSource,
    transfer: PendingTransfer,
    stats: Arc<SessionStats>,
    registry: Arc<Registry>,
    events: mpsc::Sender<TransferOutcome>,
    mut abort_rx: oneshot::Receiver<()>,
    connect_timeout: Duration,
) {
    let mode = transfer.mode;
    let filename = transfer.filename;

    let stream = tokio::select! {
        _ = &mut abort_rx => {
            tracing::debug!(session_id, "transfer aborted before the data connection opened");
            report(&events, OutcomeKind::Aborted, mode, filename, 0).await;
            return;
        }
        result = establish(source, connect_timeout) => match result {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "data connection failed to open");
                report(&events, OutcomeKind::Failed, mode, filename, 0).await;
                return;
            }
        }
    };

    let counters = Counters {
        outbound: mode.is_outbound(),
        stats,
        registry,
    };
    let (kind, bytes) = match transfer.channel {
        TransferChannel::Read(file) => pump_out(stream, file, &mut abort_rx, &counters).await,
        TransferChannel::Write(file) => pump_in(stream, file, &mut abort_rx, &counters).await,
    };

    tracing::debug!(session_id, bytes, outcome = ?kind, "data connection finished");
    report(&events, kind, mode, filename, bytes).await;
}

async fn report(
    events: &mpsc::Sender<TransferOutcome>,
    kind: OutcomeKind,
    mode: TransferMode,
    filename: String,
    bytes: u64,
) {
    let outcome = TransferOutcome {
        kind,
        mode,
        filename,
        bytes,
    };
    if events.send(outcome).await.is_err() {
        tracing::debug!("control connection gone, dropping transfer outcome");
    }
}

async fn establish(
    source: DataSource,
    connect_timeout: Duration,
) -> Result<TcpStream, EstablishError> {
    match source {
        DataSource::Passive(reservation) => {
            Ok(reservation.wait_accept(connect_timeout).await?)
        }
        DataSource::Active(endpoint) => {
            match tokio::time::timeout(connect_timeout, TcpStream::connect(endpoint)).await {
                Err(_) => Err(EstablishError::DialTimeout),
                Ok(Err(e)) => Err(EstablishError::Dial(e)),
                Ok(Ok(stream)) => Ok(stream),
            }
        }
    }
}

struct Counters {
    outbound: bool,
    stats: Arc<SessionStats>,
    registry: Arc<Registry>,
}

impl Counters {
    fn add(&self, bytes: u64) {
        if self.outbound {
            self.stats.add_downloaded(bytes);
            self.registry.add_downloaded(bytes);
        } else {
            self.stats.add_uploaded(bytes);
            self.registry.add_uploaded(bytes);
        }
    }
}

/// Server-to-client pump (RETR, listings)
async fn pump_out<S>(
    mut stream: S,
    mut file: Box<dyn AsyncRead + Send + Unpin>,
    abort_rx: &mut oneshot::Receiver<()>,
    counters: &Counters,
) -> (OutcomeKind, u64)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; DATA_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = tokio::select! {
            _ = &mut *abort_rx => return (OutcomeKind::Aborted, total),
            read = file.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, "transfer source failed");
                    return (OutcomeKind::Failed, total);
                }
            }
        };

        let send = async {
            stream.write_all(&buf[..n]).await?;
            stream.flush().await
        };
        tokio::select! {
            _ = &mut *abort_rx => return (OutcomeKind::Aborted, total),
            written = send => {
                if let Err(e) = written {
                    tracing::warn!(error = %e, "data socket write failed");
                    return (OutcomeKind::Failed, total);
                }
            }
        }

        total += n as u64;
        counters.add(n as u64);
    }

    let _ = stream.shutdown().await;
    (OutcomeKind::Success, total)
}

/// Client-to-server pump (STOR, APPE, STOU)
async fn pump_in<S>(
    mut stream: S,
    mut file: Box<dyn AsyncWrite + Send + Unpin>,
    abort_rx: &mut oneshot::Receiver<()>,
    counters: &Counters,
) -> (OutcomeKind, u64)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; DATA_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = tokio::select! {
            _ = &mut *abort_rx => return (OutcomeKind::Aborted, total),
            read = stream.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, "data socket read failed");
                    return (OutcomeKind::Failed, total);
                }
            }
        };

        if let Err(e) = file.write_all(&buf[..n]).await {
            tracing::warn!(error = %e, "transfer sink failed");
            return (OutcomeKind::Failed, total);
        }
        total += n as u64;
        counters.add(n as u64);
    }

    if let Err(e) = file.shutdown().await {
        tracing::warn!(error = %e, "transfer sink close failed");
        return (OutcomeKind::Failed, total);
    }
    (OutcomeKind::Success, total)
}
