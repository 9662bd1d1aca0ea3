//! Shared service bundle handed to every session

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::FtpConfig;
use crate::executor::Executor;
use crate::filter::FilterChain;
use crate::fs::FileSystem;
use crate::passive::PassivePool;
use crate::registry::Registry;
use crate::users::UserStore;

/// Immutable-after-boot bundle of collaborators.
///
/// One `FtpState` exists per server; every control connection holds an
/// `Arc` to it. Only `suspended` changes at runtime.
pub struct FtpState {
    pub config: FtpConfig,
    pub filesystem: Arc<dyn FileSystem>,
    pub users: Arc<dyn UserStore>,
    pub filters: Arc<FilterChain>,
    pub registry: Arc<Registry>,
    pub passive: Arc<PassivePool>,
    pub executor: Executor,

    suspended: AtomicBool,
    next_session_id: AtomicU64,
}

impl FtpState {
    pub fn new(
        config: FtpConfig,
        filesystem: Arc<dyn FileSystem>,
        users: Arc<dyn UserStore>,
    ) -> Arc<Self> {
        let bind_ip: IpAddr = config
            .hostname
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let passive = PassivePool::new(bind_ip, &config.pasv_ports);
        let executor = Executor::new(config.workers);

        Arc::new(Self {
            config,
            filesystem,
            users,
            filters: Arc::new(FilterChain::new()),
            registry: Arc::new(Registry::new()),
            passive,
            executor,
            suspended: AtomicBool::new(false),
            next_session_id: AtomicU64::new(1),
        })
    }

    /// Whether the server refuses new sessions with `421`
    pub fn suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    pub fn set_suspended(&self, value: bool) {
        self.suspended.store(value, Ordering::Release);
    }

    /// Allocate the next session id
    pub fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }
}
