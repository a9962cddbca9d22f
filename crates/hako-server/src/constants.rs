//! Server configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default SSH port for the hako SFTP server.
pub const DEFAULT_SSH_PORT: u16 = 2022;

/// Default bind address (localhost only for security).
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// SSH authentication rejection delay (prevents timing attacks).
pub const SSH_AUTH_REJECTION_DELAY: Duration = Duration::from_secs(1);

/// Default AWS region when the config names none.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Largest object a single put may carry on S3-compatible stores (5 GiB).
pub const DEFAULT_MAX_OBJECT_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Directory entries returned per SFTP `READDIR` response.
pub const READDIR_BATCH: usize = 128;

/// Only subsystem this server speaks.
pub const SFTP_SUBSYSTEM: &str = "sftp";
