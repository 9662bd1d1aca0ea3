//! Control connections
//!
//! One task per client, owning the [`Session`] exclusively. The loop
//! serializes four event sources: control-socket reads, data-connection
//! outcome reports, the server shutdown broadcast and the idle deadline.
//! Replies are written through a buffered writer and flushed before the
//! next line is dispatched, which is the backpressure gate the protocol
//! ordering relies on: in particular, a transfer's data connection is
//! only opened *after* the preliminary `150` has been flushed, so the
//! final `226`/`426` can never overtake it.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::commands::Command;
use crate::data::{self, DataSource, OutcomeKind, TransferOutcome};
use crate::error::Result;
use crate::executor::Executed;
use crate::registry::SessionEntry;
use crate::reply::Reply;
use crate::session::{DataOpener, Session};
use crate::state::FtpState;

/// Hard cap on a single control line. Longer input without a CRLF is
/// answered with `500` and the connection is closed.
const MAX_LINE_BYTES: usize = 8 * 1024;

/// Outcome reports queued between a data connection and its session
const EVENT_CHANNEL_CAPACITY: usize = 8;

/// Whether the connection keeps serving after a dispatch
enum Flow {
    Continue,
    Close,
}

/// What the select loop woke up for
enum Event {
    Read(std::io::Result<usize>),
    Outcome(TransferOutcome),
    Shutdown,
    IdleTimeout,
}

/// Serve one control connection until the peer leaves, QUIT completes,
/// the idle deadline fires or the server shuts down.
pub async fn run<S>(
    stream: S,
    remote: SocketAddr,
    local: SocketAddr,
    state: Arc<FtpState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let id = state.next_session_id();
    let session = Session::new(id, remote, local, state.config.guest);
    let (reader, writer) = tokio::io::split(stream);
    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let mut connection = ControlConnection {
        reader,
        writer: BufWriter::new(writer),
        buffer: BytesMut::with_capacity(1024),
        session,
        state,
        events_tx,
        events_rx,
    };

    connection.register().await;
    let result = connection.serve(&mut shutdown_rx).await;
    connection.close().await;
    result
}

struct ControlConnection<S> {
    reader: ReadHalf<S>,
    writer: BufWriter<WriteHalf<S>>,
    buffer: BytesMut,
    session: Session,
    state: Arc<FtpState>,
    events_tx: mpsc::Sender<TransferOutcome>,
    events_rx: mpsc::Receiver<TransferOutcome>,
}

impl<S> ControlConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn register(&self) {
        self.state
            .registry
            .register(SessionEntry {
                id: self.session.id,
                remote: self.session.remote,
                connected_at: self.session.created_at,
                stats: self.session.stats.clone(),
            })
            .await;
    }

    async fn serve(&mut self, shutdown_rx: &mut broadcast::Receiver<()>) -> Result<()> {
        tracing::info!(
            session_id = self.session.id,
            remote = %self.session.remote,
            "control connection opened"
        );

        if self.state.suspended() {
            let _ = self.dispatch(Command::Unavailable).await?;
            return Ok(());
        }
        let _ = self.dispatch(Command::Welcome).await?;

        loop {
            if self.session.poisoned && !self.session.interrupt_state {
                break;
            }

            // Drain buffered lines first; reads only happen when no
            // dispatchable line is waiting.
            if let Some(line) = self.next_line() {
                let command = Command::parse(&line);
                if let Flow::Close = self.dispatch(command).await? {
                    break;
                }
                continue;
            }

            let idle = self.state.config.timeout();
            let event = tokio::select! {
                read = self.reader.read_buf(&mut self.buffer) => Event::Read(read),
                outcome = self.events_rx.recv() => match outcome {
                    Some(outcome) => Event::Outcome(outcome),
                    // Unreachable while we hold a sender clone
                    None => continue,
                },
                _ = shutdown_rx.recv() => Event::Shutdown,
                _ = tokio::time::sleep(idle), if !self.session.interrupt_state => {
                    Event::IdleTimeout
                }
            };

            match event {
                Event::Read(Ok(0)) => {
                    tracing::debug!(session_id = self.session.id, "peer closed the connection");
                    break;
                }
                Event::Read(Ok(_)) => {
                    if self.line_overflow() {
                        tracing::warn!(
                            session_id = self.session.id,
                            "control line exceeded {} bytes",
                            MAX_LINE_BYTES
                        );
                        self.write_reply(&Reply::new(500, "Line too long.")).await?;
                        break;
                    }
                }
                Event::Read(Err(e)) => {
                    tracing::debug!(session_id = self.session.id, error = %e, "control read failed");
                    break;
                }
                Event::Outcome(outcome) => {
                    if let Flow::Close = self.handle_outcome(outcome).await? {
                        break;
                    }
                }
                Event::Shutdown => {
                    let _ = self.dispatch(Command::Unavailable).await;
                    break;
                }
                Event::IdleTimeout => {
                    tracing::info!(session_id = self.session.id, "idle timeout");
                    self.write_reply(&Reply::new(
                        421,
                        "Service timeout, closing control connection.",
                    ))
                    .await?;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Extract the first complete CRLF line, honoring interrupt gating:
    /// while a transfer is outstanding only ABOR/STAT/QUIT come out,
    /// everything else stays queued for later.
    fn next_line(&mut self) -> Option<String> {
        let pos = find_crlf(&self.buffer)?;

        if self.session.interrupt_state {
            let head = String::from_utf8_lossy(&self.buffer[..pos]);
            if !Command::parse(&head).interrupt_capable() {
                return None;
            }
        }

        let line = self.buffer.split_to(pos + 2);
        Some(String::from_utf8_lossy(&line[..pos]).into_owned())
    }

    /// Whether the (partial) first line has outgrown the cap
    fn line_overflow(&self) -> bool {
        match find_crlf(&self.buffer) {
            Some(pos) => pos > MAX_LINE_BYTES,
            None => self.buffer.len() > MAX_LINE_BYTES,
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<Flow> {
        let closes = matches!(command, Command::Unavailable);
        tracing::debug!(
            session_id = self.session.id,
            command = command.name(),
            "executing command"
        );

        let state = self.state.clone();
        let executed = state
            .executor
            .execute(command, &mut self.session, &state)
            .await;
        self.finish(executed).await?;

        Ok(if closes { Flow::Close } else { Flow::Continue })
    }

    /// Write the reply (if any), maintain the interrupt window, and open
    /// the data connection for a freshly armed transfer.
    async fn finish(&mut self, executed: Executed) -> Result<()> {
        let reply = executed.reply;

        if !reply.is_noop() {
            self.write_reply(&reply).await?;
            tracing::debug!(
                session_id = self.session.id,
                command = executed.name,
                code = reply.code(),
                "reply sent"
            );

            if reply.is_preliminary() {
                self.session.interrupt_state = true;
            } else if executed.clears_interrupt && self.session.interrupt_state {
                self.session.interrupt_state = false;
            }
        }

        // The 150 is on the wire; only now may the transfer start.
        if reply.is_preliminary() && self.session.transfer.is_some() {
            self.start_transfer();
        }
        Ok(())
    }

    /// Serialize a reply chain and push it to the OS
    async fn write_reply(&mut self, reply: &Reply) -> Result<()> {
        self.writer
            .write_all(reply.serialize_chain().as_bytes())
            .await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Spawn the data connection for the armed transfer
    fn start_transfer(&mut self) {
        let transfer = match self.session.transfer.take() {
            Some(transfer) => transfer,
            None => return,
        };
        let mode = transfer.mode;
        let filename = transfer.filename.clone();

        let opener = std::mem::replace(&mut self.session.opener, DataOpener::None);
        let source = match opener {
            DataOpener::Passive(reservation) => DataSource::Passive(reservation),
            DataOpener::Active(endpoint) => DataSource::Active(endpoint),
            DataOpener::None => {
                // Arming commands verify the opener, so this only
                // happens if the session is already tearing down.
                tracing::warn!(
                    session_id = self.session.id,
                    "transfer armed without an opener"
                );
                let _ = self.events_tx.try_send(TransferOutcome {
                    kind: OutcomeKind::Failed,
                    mode,
                    filename,
                    bytes: 0,
                });
                return;
            }
        };

        let (abort_tx, abort_rx) = oneshot::channel();
        self.session.data_abort = Some(abort_tx);
        data::spawn(
            self.session.id,
            source,
            transfer,
            self.session.stats.clone(),
            self.state.registry.clone(),
            self.events_tx.clone(),
            abort_rx,
            self.state.config.timeout(),
        );
    }

    /// A data connection reported; emit the matching outcome command
    async fn handle_outcome(&mut self, outcome: TransferOutcome) -> Result<Flow> {
        self.session.data_abort = None;
        self.session.transfer = None;

        tracing::info!(
            session_id = self.session.id,
            file = %outcome.filename,
            bytes = outcome.bytes,
            outcome = ?outcome.kind,
            "transfer finished"
        );

        let command = match outcome.kind {
            OutcomeKind::Success => Command::TransferSuccess {
                filename: outcome.filename,
            },
            OutcomeKind::Failed => Command::TransferFailed,
            OutcomeKind::Aborted => Command::TransferAborted,
        };
        self.dispatch(command).await
    }

    async fn close(&mut self) {
        self.state.registry.remove(self.session.id).await;
        // Dropping the opener cancels a pending passive reservation;
        // dropping the abort sender stops a live data connection.
        self.session.clear_opener();
        self.session.data_abort = None;
        let _ = self.writer.shutdown().await;

        tracing::info!(
            session_id = self.session.id,
            uploaded = self.session.stats.uploaded(),
            downloaded = self.session.stats.downloaded(),
            "control connection closed"
        );
    }
}

fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|window| window == b"\r\n")
}
