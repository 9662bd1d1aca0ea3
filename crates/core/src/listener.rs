//! Control-connection listener
//!
//! Accepts TCP clients and spawns one control task per connection.
//! Children are isolated: a failed or panicking connection is logged and
//! everything else keeps serving.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::control;
use crate::error::{Error, Result};
use crate::state::FtpState;

/// The bound FTP control listener
pub struct FtpListener {
    listener: TcpListener,
    state: Arc<FtpState>,
    shutdown_tx: broadcast::Sender<()>,
}

impl FtpListener {
    /// Bind to the configured `(hostname, port)`.
    ///
    /// Port 0 binds an ephemeral port; [`FtpListener::local_addr`]
    /// reports the actual one.
    pub async fn bind(state: Arc<FtpState>) -> Result<Self> {
        let addr = state.config.bind_addr();
        let listener = TcpListener::bind(&addr).await.map_err(|source| Error::Bind {
            addr: addr.clone(),
            source,
        })?;
        let (shutdown_tx, _) = broadcast::channel(1);

        tracing::info!(addr = %addr, "FTP control listener bound");
        Ok(Self {
            listener,
            state,
            shutdown_tx,
        })
    }

    /// The address the listener is actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// A handle that stops the accept loop and tells every live
    /// connection to wind down with `421`
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Accept clients until shutdown is signalled
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tracing::info!("FTP listener ready, waiting for connections...");

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = shutdown_rx.recv() => {
                    tracing::info!("FTP listener shutdown requested");
                    break;
                }
            };

            let (stream, remote) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let local = match stream.local_addr() {
                Ok(local) => local,
                Err(e) => {
                    tracing::warn!(error = %e, "could not read local address");
                    continue;
                }
            };

            let state = self.state.clone();
            let child_shutdown = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                if let Err(e) = control::run(stream, remote, local, state, child_shutdown).await {
                    tracing::error!(remote = %remote, error = %e, "control connection failed");
                }
            });
        }

        tracing::info!("FTP listener stopped");
        Ok(())
    }
}
