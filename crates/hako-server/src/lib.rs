//! hako server library
//!
//! SFTP over SSH, with each account rooted in an object store bucket.

pub mod auth;
pub mod config;
pub mod constants;
pub mod request;
pub mod session;
pub mod sftp;
pub mod ssh;

pub use auth::Authenticator;
pub use config::{Account, ConfigError, ServerConfig, StoreBackend, StoreConfig};
pub use request::{FileCmd, FileList, Method, Request};
pub use session::{Listing, SessionAdapter};
pub use sftp::SftpSession;
pub use ssh::{ServerError, ServerState, SshServer, SshServerConfig, StoreFactory};
