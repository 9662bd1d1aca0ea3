//! Passive-mode listener pool
//!
//! PASV/EPSV reserve one port from a configured set, bind a listener on
//! it and hand the session a [`PassiveReservation`]. The reservation
//! accepts exactly one client; it frees its port when consumed, when
//! cancelled (dropped) or when the owning session closes. A configured
//! port of `0` binds an ephemeral port and reports the bound one.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Reservation failures
#[derive(Debug, Error)]
pub enum PassiveError {
    #[error("No passive port available")]
    Exhausted,

    #[error("Passive socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("Client did not connect in time")]
    AcceptTimeout,

    #[error("Passive listener went away")]
    ListenerClosed,
}

/// Shared pool of passive-mode ports
pub struct PassivePool {
    bind_ip: IpAddr,
    free: Mutex<Vec<u16>>,
}

impl PassivePool {
    /// A pool over the configured port set, listening on `bind_ip`
    pub fn new(bind_ip: IpAddr, ports: &[u16]) -> Arc<Self> {
        Arc::new(Self {
            bind_ip,
            free: Mutex::new(ports.to_vec()),
        })
    }

    /// Pool bound on all interfaces with the given ports
    pub fn any(ports: &[u16]) -> Arc<Self> {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), ports)
    }

    /// Reserve a port for `session_id` and start listening on it.
    ///
    /// Tries each free port until one binds; ports that fail to bind are
    /// dropped from the pool for this attempt and returned afterwards.
    pub async fn reserve(
        self: &Arc<Self>,
        session_id: u64,
    ) -> Result<PassiveReservation, PassiveError> {
        loop {
            let candidate = {
                let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
                if free.is_empty() {
                    return Err(PassiveError::Exhausted);
                }
                free.remove(0)
            };

            let listener = match TcpListener::bind((self.bind_ip, candidate)).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!(port = candidate, error = %e, "passive port failed to bind");
                    self.release(candidate);
                    if candidate == 0 {
                        // Ephemeral bind failing is not a port conflict;
                        // retrying would spin.
                        return Err(PassiveError::Socket(e));
                    }
                    continue;
                }
            };

            let addr = listener.local_addr().map_err(PassiveError::Socket)?;
            let (accept_tx, accept_rx) = oneshot::channel();
            let task = tokio::spawn(async move {
                let _ = accept_tx.send(listener.accept().await.map(|(stream, _)| stream));
            });

            tracing::debug!(session_id, port = addr.port(), "passive port reserved");
            return Ok(PassiveReservation {
                pool: self.clone(),
                token: candidate,
                addr,
                session_id,
                accept_rx,
                task,
                released: false,
            });
        }
    }

    fn release(&self, token: u16) {
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        free.push(token);
    }

    /// Number of ports currently free
    pub fn available(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// An armed passive listener owned by one session.
///
/// Dropping the reservation cancels it: the accept task is aborted and
/// the port returns to the pool.
pub struct PassiveReservation {
    pool: Arc<PassivePool>,
    token: u16,
    addr: SocketAddr,
    session_id: u64,
    accept_rx: oneshot::Receiver<std::io::Result<TcpStream>>,
    task: JoinHandle<()>,
    released: bool,
}

impl PassiveReservation {
    /// The address the listener is bound to (real port, even for
    /// ephemeral reservations)
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the single client connection, up to `deadline`.
    /// Consumes the reservation; the port is freed either way.
    pub async fn wait_accept(
        mut self,
        deadline: std::time::Duration,
    ) -> Result<TcpStream, PassiveError> {
        let received = tokio::time::timeout(deadline, &mut self.accept_rx).await;
        self.free_port();
        match received {
            Err(_) => Err(PassiveError::AcceptTimeout),
            Ok(Err(_)) => Err(PassiveError::ListenerClosed),
            Ok(Ok(result)) => result.map_err(PassiveError::Socket),
        }
    }

    fn free_port(&mut self) {
        if !self.released {
            self.released = true;
            self.task.abort();
            self.pool.release(self.token);
            tracing::debug!(
                session_id = self.session_id,
                port = self.addr.port(),
                "passive port released"
            );
        }
    }
}

impl Drop for PassiveReservation {
    fn drop(&mut self) {
        self.free_port();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reserve_and_accept() {
        let pool = PassivePool::new(IpAddr::V4(Ipv4Addr::LOCALHOST), &[0]);
        let reservation = pool.reserve(1).await.unwrap();
        let addr = reservation.addr();
        assert_ne!(addr.port(), 0);
        assert_eq!(pool.available(), 0);

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let stream = reservation
            .wait_accept(Duration::from_secs(2))
            .await
            .unwrap();
        client.await.unwrap();
        assert_eq!(stream.local_addr().unwrap().port(), addr.port());
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_and_cancel() {
        let pool = PassivePool::new(IpAddr::V4(Ipv4Addr::LOCALHOST), &[0, 0]);
        let a = pool.reserve(1).await.unwrap();
        let _b = pool.reserve(2).await.unwrap();
        assert!(matches!(
            pool.reserve(3).await,
            Err(PassiveError::Exhausted)
        ));

        // Cancelling one reservation frees its slot
        drop(a);
        assert_eq!(pool.available(), 1);
        assert!(pool.reserve(3).await.is_ok());
    }

    #[tokio::test]
    async fn test_accept_timeout_frees_port() {
        let pool = PassivePool::new(IpAddr::V4(Ipv4Addr::LOCALHOST), &[0]);
        let reservation = pool.reserve(1).await.unwrap();
        let result = reservation.wait_accept(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(PassiveError::AcceptTimeout)));
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_client_can_connect_before_wait() {
        let pool = PassivePool::new(IpAddr::V4(Ipv4Addr::LOCALHOST), &[0]);
        let reservation = pool.reserve(1).await.unwrap();
        let addr = reservation.addr();

        let _client = TcpStream::connect(addr).await.unwrap();
        // Give the accept task a moment to pick the connection up
        tokio::time::sleep(Duration::from_millis(20)).await;
        let stream = reservation
            .wait_accept(Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(stream.local_addr().unwrap().port(), addr.port());
    }
}
