//! SSH server for hako
//!
//! Accepts SSH connections, authenticates them against the configured
//! accounts, and serves the `sftp` subsystem over session channels.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hako_vfs::{MemoryStore, ObjectFs, ObjectStore, S3Client, S3Store};
use parking_lot::Mutex;
use russh::keys::{ssh_key, PrivateKey};
use russh::server::{self, Auth, Msg, Server as _, Session};
use russh::{Channel, ChannelId};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::Authenticator;
use crate::config::{Account, ConfigError, ServerConfig, StoreBackend};
use crate::constants::{SFTP_SUBSYSTEM, SSH_AUTH_REJECTION_DELAY};
use crate::session::SessionAdapter;
use crate::sftp::SftpSession;

/// Server startup errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to load host key {path}: {source}")]
    HostKey {
        path: PathBuf,
        #[source]
        source: russh::keys::Error,
    },

    #[error("failed to generate host key: {0}")]
    KeyGen(#[from] ssh_key::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// SSH server configuration
#[derive(Clone)]
pub struct SshServerConfig {
    pub bind_addr: SocketAddr,
    pub host_key: PrivateKey,
}

impl SshServerConfig {
    /// Create config with an ephemeral key (for testing)
    pub fn ephemeral(bind_addr: SocketAddr) -> Result<Self, ServerError> {
        let host_key = PrivateKey::random(&mut rand::thread_rng(), russh::keys::Algorithm::Ed25519)?;
        Ok(Self {
            bind_addr,
            host_key,
        })
    }

    /// Listen address and host key from the server config.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        let bind_addr = config.bind_addr()?;
        match &config.host_key_path {
            Some(path) => {
                let host_key = russh::keys::load_secret_key(path, None).map_err(|source| {
                    ServerError::HostKey {
                        path: path.clone(),
                        source,
                    }
                })?;
                Ok(Self {
                    bind_addr,
                    host_key,
                })
            }
            None => {
                warn!("No host_key_path configured, using an ephemeral host key");
                Self::ephemeral(bind_addr)
            }
        }
    }
}

/// Hands out the object store a session's bucket lives in.
pub enum StoreFactory {
    S3(S3Client),
    /// One process-local store per bucket, created on first login.
    Memory(Mutex<HashMap<String, Arc<MemoryStore>>>),
}

impl StoreFactory {
    pub async fn from_config(config: &ServerConfig) -> Self {
        match config.store.backend {
            StoreBackend::S3 => Self::S3(config.s3_config().client().await),
            StoreBackend::Memory => Self::memory(),
        }
    }

    pub fn memory() -> Self {
        Self::Memory(Mutex::new(HashMap::new()))
    }

    pub fn for_bucket(&self, bucket: &str) -> Arc<dyn ObjectStore> {
        match self {
            Self::S3(client) => Arc::new(S3Store::new(client.clone(), bucket)),
            Self::Memory(buckets) => buckets
                .lock()
                .entry(bucket.to_string())
                .or_insert_with(|| Arc::new(MemoryStore::new()))
                .clone(),
        }
    }
}

/// State shared by every connection.
pub struct ServerState {
    pub auth: Authenticator,
    pub stores: StoreFactory,
    pub max_object_size: u64,
}

impl ServerState {
    pub async fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        Ok(Self {
            auth: Authenticator::from_config(config)?,
            stores: StoreFactory::from_config(config).await,
            max_object_size: config.max_object_size,
        })
    }
}

/// SSH server
pub struct SshServer {
    config: SshServerConfig,
    state: Arc<ServerState>,
}

impl SshServer {
    pub fn new(config: SshServerConfig, state: Arc<ServerState>) -> Self {
        Self { config, state }
    }

    /// Run the SSH server
    pub async fn run(&self) -> Result<(), ServerError> {
        let config = russh::server::Config {
            auth_rejection_time: SSH_AUTH_REJECTION_DELAY,
            auth_rejection_time_initial: Some(Duration::from_secs(0)),
            keys: vec![self.config.host_key.clone()],
            ..Default::default()
        };

        info!("Starting SSH server on {}", self.config.bind_addr);

        let mut server = Server {
            state: self.state.clone(),
        };
        let socket = TcpListener::bind(self.config.bind_addr).await?;

        server
            .run_on_socket(Arc::new(config), &socket)
            .await
            .map_err(|e| ServerError::Io(std::io::Error::other(e)))
    }
}

/// Server factory - creates handlers for each connection
struct Server {
    state: Arc<ServerState>,
}

impl server::Server for Server {
    type Handler = ConnectionHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
        ConnectionHandler::new(self.state.clone(), peer_addr)
    }

    fn handle_session_error(&mut self, error: <Self::Handler as server::Handler>::Error) {
        error!("Session error: {:?}", error);
    }
}

/// Authenticated identity for the rest of the connection.
struct Login {
    /// `<username>:<uuid>`, used in every log line of the session.
    tag: String,
    bucket: String,
}

/// Handler for a single SSH connection
struct ConnectionHandler {
    state: Arc<ServerState>,
    peer: Option<SocketAddr>,
    login: Option<Login>,
    channels: HashMap<ChannelId, Channel<Msg>>,
    cancel: CancellationToken,
}

impl ConnectionHandler {
    fn new(state: Arc<ServerState>, peer: Option<SocketAddr>) -> Self {
        Self {
            state,
            peer,
            login: None,
            channels: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn accept(&mut self, account: &Account, method: &str) -> Auth {
        let tag = format!("{}:{}", account.username, Uuid::new_v4());
        info!(user = %tag, bucket = %account.bucket, peer = ?self.peer, method, "Authenticated");
        self.login = Some(Login {
            tag,
            bucket: account.bucket.clone(),
        });
        Auth::Accept
    }

    fn reject(&self, user: &str, method: &str) -> Auth {
        warn!(user, peer = ?self.peer, method, "Authentication rejected");
        Auth::reject()
    }

    /// Filesystem for the logged-in account, tied to this connection's lifetime.
    fn filesystem(&self, login: &Login) -> ObjectFs {
        let store = self.state.stores.for_bucket(&login.bucket);
        ObjectFs::new(store, login.tag.clone())
            .with_cancellation(self.cancel.child_token())
            .with_max_object_size(self.state.max_object_size)
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(login) = &self.login {
            info!(user = %login.tag, "Connection closed");
        }
    }
}

impl server::Handler for ConnectionHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        let account = self.state.auth.check_password(user, password).cloned();
        Ok(match account {
            Some(account) => self.accept(&account, "password"),
            None => self.reject(user, "password"),
        })
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &ssh_key::PublicKey,
    ) -> Result<Auth, Self::Error> {
        let account = self.state.auth.check_public_key(user, public_key).cloned();
        Ok(match account {
            Some(account) => self.accept(&account, "publickey"),
            None => self.reject(user, "publickey"),
        })
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!("Channel {} opened", channel.id());
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if name != SFTP_SUBSYSTEM {
            warn!("Rejecting subsystem {} on channel {}", name, channel_id);
            session.channel_failure(channel_id)?;
            return Ok(());
        }

        let (Some(login), Some(channel)) = (self.login.as_ref(), self.channels.remove(&channel_id))
        else {
            warn!("sftp requested on unknown channel {}", channel_id);
            session.channel_failure(channel_id)?;
            return Ok(());
        };

        let fs = self.filesystem(login);
        info!(user = %login.tag, "Starting sftp on channel {}", channel_id);
        session.channel_success(channel_id)?;
        russh_sftp::server::run(channel.into_stream(), SftpSession::new(SessionAdapter::new(fs)))
            .await;
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!("Channel {} closed", channel);
        self.channels.remove(&channel);
        Ok(())
    }
}
