//! skiff-core: an async FTP server engine
//!
//! Implements the RFC 959 control/data split with the common extensions
//! (EPRT/EPSV, MLSD/MLST, MDTM, SIZE, TVFS, REST) on top of tokio. One
//! task owns each control connection and its [`session::Session`]; data
//! connections run as their own tasks and report transfer outcomes back
//! over a channel. Filesystem, user store and data filters are pluggable
//! via the traits in [`fs`], [`users`] and [`filter`].

pub mod commands;
pub mod config;
pub mod control;
pub mod data;
pub mod error;
pub mod executor;
pub mod filter;
pub mod fs;
pub mod listener;
pub mod listing;
pub mod passive;
pub mod registry;
pub mod reply;
pub mod session;
pub mod state;
pub mod users;

pub use config::FtpConfig;
pub use error::{Error, Result};
pub use fs::{FileSystem, LocalFileSystem};
pub use listener::FtpListener;
pub use reply::Reply;
pub use state::FtpState;
pub use users::{StaticUserStore, UserStore};
