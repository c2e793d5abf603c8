//! russh-backed [`RemoteExecutor`] implementation.
//!
//! One SSH session per operation: connect, authenticate, run a single exec
//! channel, collect output, disconnect. Connection establishment goes through
//! the transient-retry policy; authentication rejection aborts immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh::{ChannelMsg, Disconnect};
use russh_keys::key;
use tracing::{debug, instrument};

use super::retry::{retry_transient, RetryPolicy};
use super::{RemoteError, RemoteExecutor, RemoteOutput, SshCredentials};

/// Host-key checking is intentionally permissive: targets are instances this
/// system just created, their keys are not known ahead of time.
struct AcceptingHostKeys;

#[async_trait]
impl client::Handler for AcceptingHostKeys {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// SSH transport for the remote execution engine.
pub struct SshExecutor {
    session_config: Arc<client::Config>,
    policy: RetryPolicy,
    connect_timeout: Duration,
}

impl SshExecutor {
    pub fn new(policy: RetryPolicy, connect_timeout: Duration) -> Self {
        Self {
            session_config: Arc::new(client::Config::default()),
            policy,
            connect_timeout,
        }
    }

    /// Open a session and authenticate, classifying failures for the retry
    /// policy: socket errors are transient, everything else is fatal.
    async fn open_session(
        &self,
        host: &str,
        port: u16,
        credentials: &SshCredentials,
    ) -> Result<client::Handle<AcceptingHostKeys>, RemoteError> {
        let connect = tokio::time::timeout(
            self.connect_timeout,
            client::connect(self.session_config.clone(), (host, port), AcceptingHostKeys),
        )
        .await;

        let mut handle = match connect {
            Ok(Ok(handle)) => handle,
            Ok(Err(error)) => return Err(classify_connect_error(host, port, error)),
            Err(_elapsed) => {
                return Err(RemoteError::Connection {
                    host: host.to_string(),
                    port,
                    source: std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "ssh connect timed out",
                    ),
                })
            }
        };

        let authenticated = if let Some(pem) = &credentials.private_key {
            let key_pair =
                russh_keys::decode_secret_key(pem, None).map_err(|e| RemoteError::InvalidKey {
                    reason: e.to_string(),
                })?;
            handle
                .authenticate_publickey(&credentials.user, Arc::new(key_pair))
                .await
        } else if let Some(password) = &credentials.password {
            handle
                .authenticate_password(&credentials.user, password)
                .await
        } else {
            return Err(RemoteError::AuthenticationFailed {
                host: host.to_string(),
                user: credentials.user.clone(),
                reason: "no password or private key supplied".to_string(),
            });
        };

        match authenticated {
            Ok(true) => Ok(handle),
            Ok(false) => Err(RemoteError::AuthenticationFailed {
                host: host.to_string(),
                user: credentials.user.clone(),
                reason: "rejected by server".to_string(),
            }),
            // a socket failure mid-handshake is a connection problem, not a
            // credential problem
            Err(russh::Error::IO(source)) => Err(RemoteError::Connection {
                host: host.to_string(),
                port,
                source,
            }),
            Err(error) => Err(RemoteError::AuthenticationFailed {
                host: host.to_string(),
                user: credentials.user.clone(),
                reason: error.to_string(),
            }),
        }
    }

    async fn exec_once(
        &self,
        host: &str,
        port: u16,
        credentials: &SshCredentials,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<RemoteOutput, RemoteError> {
        let handle = self.open_session(host, port, credentials).await?;

        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| session_error(host, e))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| session_error(host, e))?;

        if let Some(content) = stdin {
            channel
                .data(content)
                .await
                .map_err(|e| session_error(host, e))?;
            channel.eof().await.map_err(|e| session_error(host, e))?;
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                    stderr.extend_from_slice(data);
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = Some(exit_status);
                }
                _ => {}
            }
        }

        let _ = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;

        let exit_code = exit_code.ok_or_else(|| RemoteError::Session {
            host: host.to_string(),
            message: "channel closed without exit status".to_string(),
        })?;

        debug!(host, exit_code, "remote command finished");
        Ok(RemoteOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
        })
    }
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self::new(
            RetryPolicy::default(),
            Duration::from_secs(crate::constants::remote::CONNECT_TIMEOUT_SECS),
        )
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    #[instrument(skip(self, credentials), fields(user = %credentials.user))]
    async fn run(
        &self,
        host: &str,
        port: u16,
        credentials: &SshCredentials,
        command: &str,
    ) -> Result<RemoteOutput, RemoteError> {
        retry_transient(self.policy, || {
            self.exec_once(host, port, credentials, command, None)
        })
        .await
    }

    #[instrument(skip(self, credentials, content), fields(user = %credentials.user, bytes = content.len()))]
    async fn upload(
        &self,
        host: &str,
        port: u16,
        credentials: &SshCredentials,
        content: &[u8],
        remote_path: &str,
    ) -> Result<(), RemoteError> {
        let command = upload_command(remote_path);
        let output = retry_transient(self.policy, || {
            self.exec_once(host, port, credentials, &command, Some(content))
        })
        .await?;

        if output.is_success() {
            Ok(())
        } else {
            Err(RemoteError::Session {
                host: host.to_string(),
                message: format!(
                    "upload to {remote_path} exited {}: {}",
                    output.exit_code, output.stderr
                ),
            })
        }
    }
}

/// Streamed upload through a shell pipe; parent directories are created on
/// the way in so bootstrap can target fresh cache paths.
fn upload_command(remote_path: &str) -> String {
    let escaped = shell_escape::escape(remote_path.into());
    format!("mkdir -p \"$(dirname {escaped})\" && cat > {escaped}")
}

fn classify_connect_error(host: &str, port: u16, error: russh::Error) -> RemoteError {
    match error {
        russh::Error::IO(source) => RemoteError::Connection {
            host: host.to_string(),
            port,
            source,
        },
        other => RemoteError::Session {
            host: host.to_string(),
            message: other.to_string(),
        },
    }
}

fn session_error(host: &str, error: russh::Error) -> RemoteError {
    RemoteError::Session {
        host: host.to_string(),
        message: error.to_string(),
    }
}
