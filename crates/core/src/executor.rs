//! Command execution
//!
//! Per-session serialization comes for free from the owning connection
//! task; what the executor adds is the login gate and a process-wide
//! bound on concurrently executing commands, so a burst of sessions all
//! blocked in filesystem calls cannot occupy every runtime worker.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::commands::Command;
use crate::reply::Reply;
use crate::session::Session;
use crate::state::FtpState;

/// A finished command together with its reply
pub struct Executed {
    /// Canonical verb, for logging
    pub name: &'static str,
    pub reply: Reply,
    /// Whether emitting this reply ends the interrupt window
    pub clears_interrupt: bool,
}

/// Runs commands under the worker bound
pub struct Executor {
    permits: Arc<Semaphore>,
}

impl Executor {
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Execute one command for one session.
    ///
    /// Commands tagged `requires_login` short-circuit with `530` before
    /// touching any collaborator.
    pub async fn execute(
        &self,
        command: Command,
        session: &mut Session,
        state: &Arc<FtpState>,
    ) -> Executed {
        let name = command.name();
        let clears_interrupt = command.clears_interrupt();

        if command.requires_login() && !session.logged_in {
            return Executed {
                name,
                reply: Reply::new(530, "Not logged in."),
                clears_interrupt: false,
            };
        }

        // The semaphore is never closed, so acquire only fails if the
        // process is tearing down; running unthrottled then is fine.
        let _permit = self.permits.acquire().await.ok();
        let reply = command.execute(session, state).await;

        Executed {
            name,
            reply,
            clears_interrupt,
        }
    }
}
